// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Read, deserialize and validate a config file. Durations, regexes and
/// task commands are all checked here, so a returned [`ConfigFile`] can be
/// submitted as-is.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `$RUNLANE_CONFIG` if set, else `Runlane.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("RUNLANE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Runlane.toml"))
}
