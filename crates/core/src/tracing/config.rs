//! Configuration for tracing and instrumentation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Log level filter (e.g., "info", "debug", "pumpline_http=trace")
    pub log_level: String,
    /// Optional file output in addition to stderr
    #[serde(default)]
    pub log_file: Option<LogFileConfig>,
}

/// File-based logging configuration
///
/// The file is truncated on startup; one file per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Directory where log files should be written
    pub directory: PathBuf,
    /// Prefix for log file names (e.g., "cli" creates "cli.log")
    pub file_prefix: String,
    /// Whether to also output logs to stderr
    pub console_enabled: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "pumpline".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            directory: default_state_dir().join("logs"),
            file_prefix: "pumpline".to_string(),
            console_enabled: true,
        }
    }
}

impl LogFileConfig {
    /// Full path of the log file
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.log", self.file_prefix))
    }
}

/// State directory, `PUMPLINE_STATE_DIR` or the platform data dir
pub fn default_state_dir() -> PathBuf {
    std::env::var("PUMPLINE_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pumpline")
        })
}

impl InstrumentationConfig {
    /// Also write logs to the given file
    pub fn with_log_file(mut self, log_file: LogFileConfig) -> Self {
        self.log_file = Some(log_file);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InstrumentationConfig::default();
        assert_eq!(config.service_name, "pumpline");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.log_level, "info");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_log_file_path() {
        let config = InstrumentationConfig::default().with_log_file(LogFileConfig {
            directory: PathBuf::from("/tmp/pumpline-logs"),
            file_prefix: "cli".to_string(),
            console_enabled: false,
        });

        let log_file = config.log_file.unwrap();
        assert_eq!(log_file.path(), PathBuf::from("/tmp/pumpline-logs/cli.log"));
    }

    #[test]
    fn test_log_file_default_lives_under_logs() {
        let config = LogFileConfig::default();
        assert_eq!(config.file_prefix, "pumpline");
        assert!(config.directory.ends_with("logs"));
    }
}
