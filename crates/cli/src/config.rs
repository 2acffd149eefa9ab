//! CLI configuration utilities

use anyhow::{Context, Result};
use pumpline_core::ClientConfig;
use std::path::{Path, PathBuf};

/// Default config file inside the data directory
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("pumpline.toml")
}

/// Load client configuration
///
/// An explicit path must exist; otherwise the data directory's
/// `pumpline.toml` is used when present.
pub fn load_client_config(path: Option<PathBuf>, data_dir: &Path) -> Result<ClientConfig> {
    let path = path.or_else(|| {
        let default = default_config_path(data_dir);
        default.exists().then_some(default)
    });

    match &path {
        Some(path) => tracing::info!("Loading configuration from: {}", path.display()),
        None => tracing::info!("Using default configuration with environment overrides"),
    }

    ClientConfig::load(path.as_deref()).context("failed to load client configuration")
}

/// Write the default configuration as TOML
pub fn generate_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&ClientConfig::default())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pumpline.toml");

        generate_default_config(&path).unwrap();
        let config = load_client_config(Some(path), dir.path()).unwrap();

        let defaults = ClientConfig::default();
        assert_eq!(config.api.base_url, defaults.api.base_url);
        assert_eq!(config.renewal.path, defaults.renewal.path);
        assert!(config.search_limit.is_none());
    }

    #[test]
    fn test_data_dir_config_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            default_config_path(dir.path()),
            "[api]\nbase_url = \"https://stations.example\"\n",
        )
        .unwrap();

        let config = load_client_config(None, dir.path()).unwrap();
        assert_eq!(config.api.base_url, "https://stations.example");
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_client_config(Some(dir.path().join("absent.toml")), dir.path());
        assert!(result.is_err());
    }
}
