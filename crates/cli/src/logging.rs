use anyhow::Result;
use pumpline_core::tracing::{InstrumentationConfig, LogFileConfig, init_tracing};
use std::path::Path;
use tracing::Level;

/// Initialize logging for the CLI
///
/// Logs go to stderr and, unless `no_file_log` is set, to `cli.log` in the
/// data directory. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: Level, data_dir: &Path, no_file_log: bool) -> Result<()> {
    let config = InstrumentationConfig {
        service_name: "pumpline-cli".to_string(),
        log_level: level_filter(log_level),
        ..InstrumentationConfig::default()
    };

    let config = if no_file_log {
        config
    } else {
        config.with_log_file(LogFileConfig {
            directory: data_dir.to_path_buf(),
            file_prefix: "cli".to_string(),
            console_enabled: true,
        })
    };

    init_tracing(&config)
}

fn level_filter(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("pumpline={level},pumpline_core={level},pumpline_http={level}")
}
