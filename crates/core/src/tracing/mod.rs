//! Shared tracing setup for Pumpline binaries
//!
//! Libraries in the workspace only emit `tracing` events; installing a
//! subscriber is left to the binary through [`init_tracing`].

pub mod config;
pub mod init;

pub use config::{InstrumentationConfig, LogFileConfig};
pub use init::init_tracing;
