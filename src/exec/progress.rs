// src/exec/progress.rs

//! Progress extraction from process output lines.
//!
//! A task may carry a [`ProgressPattern`]: a regex applied to every output
//! line. Matching lines become [`Progress`] notifications:
//! - a named group `percent` (0-100) or `fraction` (0-1) sets the fraction,
//! - a named group `text` sets the text; otherwise the whole line is used.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::types::Stream;

/// Callback fed every complete output line by the runner.
///
/// Called from the runner's reader tasks, never from the UI thread.
pub type LineObserver = Arc<dyn Fn(Stream, &str) + Send + Sync>;

/// Progress notification: text and fractional completion, both optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub text: Option<String>,
    /// Always within `0.0..=1.0` when present.
    pub fraction: Option<f64>,
}

impl Progress {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            fraction: None,
        }
    }

    pub fn fraction(fraction: f64) -> Self {
        Self {
            text: None,
            fraction: Some(fraction.clamp(0.0, 1.0)),
        }
    }
}

/// Compiled progress regex attached to a task spec.
#[derive(Clone)]
pub struct ProgressPattern {
    regex: Regex,
    stream: Option<Stream>,
}

impl fmt::Debug for ProgressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressPattern")
            .field("regex", &self.regex.as_str())
            .field("stream", &self.stream)
            .finish()
    }
}

impl ProgressPattern {
    /// Compile a pattern that applies to both streams.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            stream: None,
        })
    }

    /// Restrict matching to a single stream.
    pub fn on_stream(mut self, stream: Stream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Parse a single line; `None` if it does not match or is on the wrong
    /// stream.
    pub fn parse(&self, stream: Stream, line: &str) -> Option<Progress> {
        if self.stream.is_some_and(|s| s != stream) {
            return None;
        }

        let caps = self.regex.captures(line)?;

        let fraction = if let Some(m) = caps.name("percent") {
            m.as_str().trim().parse::<f64>().ok().map(|p| p / 100.0)
        } else if let Some(m) = caps.name("fraction") {
            m.as_str().trim().parse::<f64>().ok()
        } else {
            None
        }
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, 1.0));

        let text = caps
            .name("text")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| line.trim_end().to_string());

        Some(Progress {
            text: Some(text),
            fraction,
        })
    }
}
