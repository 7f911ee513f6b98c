// src/config/duration.rs

use std::time::Duration;

/// Parse a human duration such as `"250ms"`, `"2s"`, `"1.5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| format!("duration '{s}' is missing a unit (ms, s, m or h)"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: f64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let unit_secs = match unit_part.trim().to_lowercase().as_str() {
        "ms" => 0.001,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        other => {
            return Err(format!(
                "unsupported duration unit '{other}'; expected ms, s, m, or h"
            ))
        }
    };

    Duration::try_from_secs_f64(value * unit_secs)
        .map_err(|e| format!("duration '{s}' out of range: {e}"))
}

/// Like [`parse_duration`], with `"none"` / `"off"` meaning no limit.
pub fn parse_optional_duration(s: &str) -> Result<Option<Duration>, String> {
    match s.trim().to_lowercase().as_str() {
        "none" | "off" => Ok(None),
        _ => parse_duration(s).map(Some),
    }
}
