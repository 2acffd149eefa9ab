//! Pumpline core types and utilities
//!
//! Shared configuration, error conventions, tracing setup and the client-side
//! search limiter used by the API client and the CLI.

pub mod config;
pub mod error;
pub mod limits;
pub mod tracing;

pub use config::{ApiConfig, ClientConfig, RenewalConfig, SearchLimitConfig};
pub use error::{CoreError, CoreResult};
pub use limits::{LimitExceeded, SearchLimiter};
