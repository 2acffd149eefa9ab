//! Client configuration
//!
//! Configuration is layered: built-in defaults, then an optional file (TOML,
//! YAML or JSON, picked by extension), then `PUMPLINE_` prefixed environment
//! variables using `__` as the section separator, e.g.
//! `PUMPLINE_API__BASE_URL=https://api.example.com`.

use crate::error::{CoreError, CoreResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PUMPLINE";

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Session renewal settings
    #[serde(default)]
    pub renewal: RenewalConfig,

    /// Optional client-side cap on search requests
    #[serde(default)]
    pub search_limit: Option<SearchLimitConfig>,
}

/// API endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,

    /// Optional bearer token sent on every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,

    /// User agent header
    pub user_agent: String,

    /// Path of the GraphQL endpoint
    pub graphql_path: String,
}

/// Session renewal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    /// Path of the token refresh endpoint
    pub path: String,

    /// GraphQL mutation posted to `path` instead of an empty REST call
    #[serde(default)]
    pub mutation: Option<String>,

    /// Upper bound for a single renewal exchange, in seconds
    pub timeout_secs: u64,
}

/// Rolling-window cap on search requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
            timeout_secs: 30,
            user_agent: concat!("pumpline/", env!("CARGO_PKG_VERSION")).to_string(),
            graphql_path: "/graphql".to_string(),
        }
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            path: "/auth/refresh".to_string(),
            mutation: None,
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Request timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl RenewalConfig {
    /// Renewal exchange timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchLimitConfig {
    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// `PUMPLINE_` prefix, `__` between nested keys
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the merged
    /// configuration fails validation
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> CoreResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(CoreError::invalid_config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the client relies on
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidConfig` describing the first violation
    pub fn validate(&self) -> CoreResult<()> {
        let base = url::Url::parse(&self.api.base_url).map_err(|e| {
            CoreError::invalid_config(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CoreError::invalid_config(format!(
                "api.base_url must use http or https, got '{}'",
                base.scheme()
            )));
        }

        for (key, path) in [
            ("api.graphql_path", &self.api.graphql_path),
            ("renewal.path", &self.renewal.path),
        ] {
            if !path.starts_with('/') {
                return Err(CoreError::invalid_config(format!(
                    "{key} must start with '/', got '{path}'"
                )));
            }
        }

        if self.renewal.timeout_secs == 0 {
            return Err(CoreError::invalid_config(
                "renewal.timeout_secs must be greater than zero",
            ));
        }

        if let Some(limit) = &self.search_limit {
            if limit.max_requests == 0 || limit.window_secs == 0 {
                return Err(CoreError::invalid_config(
                    "search_limit requires non-zero max_requests and window_secs",
                ));
            }
        }

        Ok(())
    }
}
