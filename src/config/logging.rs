//! Logging configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format for the console logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Minimum severity forwarded to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Explicit level override; falls back to `RUST_LOG`, then "info".
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub enable_file_logging: bool,
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_dir() -> String {
    "logs".to_string()
}

fn default_filename() -> String {
    "server.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::default(),
            enable_file_logging: false,
            dir: default_dir(),
            filename: default_filename(),
            rotation: default_rotation(),
        }
    }
}
