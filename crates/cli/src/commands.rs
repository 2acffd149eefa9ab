//! CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use pumpline_core::{ClientConfig, SearchLimiter};
use pumpline_http::{GraphQlRequest, RenewalError, SessionClient, SessionClientBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// GET an API path and print the JSON response
    Get {
        /// Path relative to the API base URL, e.g. /api/stations
        path: String,
    },

    /// Run a GraphQL query
    Query {
        /// GraphQL document, or @file to read it from a file
        document: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Operation to run when the document holds several
        #[arg(long)]
        operation_name: Option<String>,

        /// Run the query this many times
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        repeat: u32,

        /// Seconds to wait between repeated runs
        #[arg(long, default_value = "0")]
        interval: u64,
    },

    /// Renew the session now
    Renew,

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate a default client configuration file
    Generate {
        /// Output file path (defaults to DATA_DIR/pumpline.toml)
        output: Option<PathBuf>,
    },
}

/// The session could not be renewed; the user has to sign in again
#[derive(Debug, Error)]
#[error("Session expired, sign in again ({0})")]
pub struct SessionExpired(pub RenewalError);

impl Commands {
    pub async fn execute(self, config_path: Option<PathBuf>, data_dir: PathBuf) -> Result<()> {
        match self {
            Commands::Config { command } => command.execute(data_dir),
            Commands::Get { path } => {
                let session = Session::open(config_path, &data_dir)?;
                session.finish(get(&session.client, &path).await)
            }
            Commands::Query {
                document,
                variables,
                operation_name,
                repeat,
                interval,
            } => {
                let request = build_query(&document, variables.as_deref(), operation_name)?;
                let session = Session::open(config_path, &data_dir)?;
                let result = query(
                    &session.client,
                    &session.config,
                    &request,
                    repeat,
                    Duration::from_secs(interval),
                )
                .await;
                session.finish(result)
            }
            Commands::Renew => {
                let session = Session::open(config_path, &data_dir)?;
                let result = session.client.renew_session().await.map_err(Into::into);
                session.finish(result)
            }
        }
    }
}

/// A configured client plus the outcome reported by its session listener
struct Session {
    config: ClientConfig,
    client: SessionClient,
    expired: Arc<OnceLock<RenewalError>>,
}

impl Session {
    fn open(config_path: Option<PathBuf>, data_dir: &Path) -> Result<Self> {
        let config = config::load_client_config(config_path, data_dir)?;

        // Set once a renewal wave fails
        let expired: Arc<OnceLock<RenewalError>> = Arc::new(OnceLock::new());
        let client = SessionClientBuilder::from_config(&config)
            .session_listener(Arc::new(expiry_listener(expired.clone())))
            .build()?;

        Ok(Self {
            config,
            client,
            expired,
        })
    }

    /// Report a failed command as `SessionExpired` when the session was lost
    fn finish(&self, result: Result<()>) -> Result<()> {
        match (result, self.expired.get()) {
            (Err(_), Some(error)) => Err(SessionExpired(error.clone()).into()),
            (result, _) => result,
        }
    }
}

/// Session listener that keeps the first failed wave's error
fn expiry_listener(
    expired: Arc<OnceLock<RenewalError>>,
) -> impl Fn(&RenewalError) + Send + Sync + 'static {
    move |error: &RenewalError| {
        warn!(%error, "Session could not be renewed");
        expired.get_or_init(|| error.clone());
    }
}

impl ConfigCommands {
    pub fn execute(self, data_dir: PathBuf) -> Result<()> {
        match self {
            ConfigCommands::Generate { output } => {
                let config_path = output.unwrap_or_else(|| config::default_config_path(&data_dir));
                config::generate_default_config(&config_path)?;
                println!(
                    "Generated client configuration at: {}",
                    config_path.display()
                );
                Ok(())
            }
        }
    }
}

async fn get(client: &SessionClient, path: &str) -> Result<()> {
    let body: Value = client.get_json(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn query(
    client: &SessionClient,
    config: &ClientConfig,
    request: &GraphQlRequest<Value>,
    repeat: u32,
    interval: Duration,
) -> Result<()> {
    let limiter = config
        .search_limit
        .as_ref()
        .map(|limit| SearchLimiter::new(limit.max_requests, limit.window()));

    for run in 0..repeat {
        if run > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        if let Some(limiter) = &limiter {
            acquire(limiter).await;
        }

        let data: Value = client.graphql(request).await?;
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}

/// Wait until the limiter has room, then take a permit
async fn acquire(limiter: &SearchLimiter) {
    loop {
        match limiter.try_acquire() {
            Ok(remaining) => {
                debug!(remaining, "Search permit acquired");
                return;
            }
            Err(exceeded) => {
                info!("{exceeded}");
                tokio::time::sleep(exceeded.retry_after).await;
            }
        }
    }
}

fn build_query(
    document: &str,
    variables: Option<&str>,
    operation_name: Option<String>,
) -> Result<GraphQlRequest<Value>> {
    let document = match document.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read GraphQL document from {path}"))?,
        None => document.to_string(),
    };

    let mut request = GraphQlRequest::new(document);
    if let Some(variables) = variables {
        let variables: Value =
            serde_json::from_str(variables).context("--variables must be valid JSON")?;
        if !variables.is_object() {
            anyhow::bail!("--variables must be a JSON object");
        }
        request = request.variables(variables);
    }
    if let Some(name) = operation_name {
        request = request.operation_name(name);
    }
    Ok(request)
}
