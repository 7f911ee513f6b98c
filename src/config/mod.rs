// src/config/mod.rs

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{parse_duration, parse_optional_duration};
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, EngineSection, EngineSettings, RawConfigFile, TaskConfig, TaskEntry};
