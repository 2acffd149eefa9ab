//! Pumpline HTTP client
//!
//! An API client whose authentication failures are routed through a
//! [`RefreshCoordinator`]: when concurrent requests hit an expired session,
//! one renewal exchange runs and every affected request is replayed once.

#[macro_use]
extern crate tracing;

pub mod client;

pub use client::error::{ClientError, RenewalError};
pub use client::graphql::{GraphQlError, GraphQlRequest, GraphQlResponse};
pub use client::refresh::{RefreshCoordinator, RetryableRequest};
pub use client::renewal::{HttpRenewer, TokenRenewer};
pub use client::session::{NoopSessionListener, SessionListener};
pub use client::{SessionClient, SessionClientBuilder};
