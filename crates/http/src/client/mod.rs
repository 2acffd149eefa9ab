//! Pumpline API client

pub mod error;
pub mod graphql;
pub mod refresh;
pub mod renewal;
pub mod session;

use error::{ClientError, RenewalError};
use graphql::{GraphQlRequest, GraphQlResponse};
use pumpline_core::ClientConfig;
use refresh::{RefreshCoordinator, RetryableRequest};
use renewal::{HttpRenewer, TokenRenewer};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session::SessionListener;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("pumpline/", env!("CARGO_PKG_VERSION"));

/// API client with cookie-based sessions and single-flight renewal
///
/// Requests that fail with an expired session are renewed and replayed once
/// through the client's [`RefreshCoordinator`].
#[derive(Clone)]
pub struct SessionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    graphql_path: String,
    coordinator: Arc<RefreshCoordinator>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.base_url)
            .field("graphql_path", &self.graphql_path)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a new client with default configuration
    ///
    /// # Errors
    ///
    /// See [`SessionClientBuilder::build`]
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The coordinator guarding this client's session
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Create a request builder with authentication
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);

        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
        }

        request
    }

    /// Execute a request and decode its JSON body
    ///
    /// An expired session triggers renewal and one replay, as long as the
    /// request can be cloned. Streaming bodies cannot, and their auth errors
    /// are returned as-is.
    ///
    /// # Errors
    ///
    /// Returns a status-specific `ClientError`, or `ClientError::RenewalFailed`
    /// when the session could not be renewed
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let replay = request.try_clone();
        match (Self::send(request).await, replay) {
            (Err(error), Some(replay)) => {
                self.coordinator
                    .on_request_failure(RetryableRequest::new(move || Self::send(replay)), error)
                    .await
            }
            (result, _) => result,
        }
    }

    /// GET `path` and decode the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(self.request(Method::GET, path)).await
    }

    /// POST `body` as JSON to `path` and decode the JSON response
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }

    /// Run a GraphQL operation
    ///
    /// Both an HTTP 401 and an `UNAUTHENTICATED` error code count as an
    /// expired session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::GraphQl` when the response carries errors
    pub async fn graphql<V: Serialize, T: DeserializeOwned>(
        &self,
        request: &GraphQlRequest<V>,
    ) -> Result<T, ClientError> {
        self.coordinator
            .execute(move || async move {
                let envelope: GraphQlResponse<T> =
                    Self::send(self.request(Method::POST, &self.graphql_path).json(request))
                        .await?;
                envelope.into_result()
            })
            .await
    }

    /// Renew the session now, joining a renewal already in flight
    ///
    /// # Errors
    ///
    /// Returns the renewal error; the session listener has been notified
    pub async fn renew_session(&self) -> Result<(), RenewalError> {
        self.coordinator.renew_session().await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            trace!(%status, "Request failed");
            Err(ClientError::from_status(status, message))
        }
    }
}

/// Builder for SessionClient
#[derive(Default)]
pub struct SessionClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    graphql_path: Option<String>,
    renewal_path: Option<String>,
    renewal_mutation: Option<String>,
    renewal_timeout: Option<Duration>,
    session_listener: Option<Arc<dyn SessionListener>>,
    renewer: Option<Arc<dyn TokenRenewer>>,
    coordinator: Option<Arc<RefreshCoordinator>>,
}

impl SessionClientBuilder {
    /// Start from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = Self::default()
            .base_url(&config.api.base_url)
            .user_agent(&config.api.user_agent)
            .graphql_path(&config.api.graphql_path)
            .renewal_path(&config.renewal.path)
            .renewal_timeout(config.renewal.timeout());

        if let Some(api_key) = &config.api.api_key {
            builder = builder.api_key(api_key);
        }
        if let Some(timeout) = config.api.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(mutation) = &config.renewal.mutation {
            builder = builder.renewal_mutation(mutation);
        }
        builder
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API key for authentication
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the GraphQL endpoint path (default `/graphql`)
    pub fn graphql_path(mut self, path: impl Into<String>) -> Self {
        self.graphql_path = Some(path.into());
        self
    }

    /// Set the refresh endpoint path (default `/auth/refresh`)
    pub fn renewal_path(mut self, path: impl Into<String>) -> Self {
        self.renewal_path = Some(path.into());
        self
    }

    /// Renew with a GraphQL mutation instead of a bare POST
    pub fn renewal_mutation(mut self, mutation: impl Into<String>) -> Self {
        self.renewal_mutation = Some(mutation.into());
        self
    }

    /// Bound each renewal exchange
    pub fn renewal_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_timeout = Some(timeout);
        self
    }

    /// Notify `listener` when the session cannot be renewed
    pub fn session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.session_listener = Some(listener);
        self
    }

    /// Replace the HTTP refresh exchange
    pub fn renewer(mut self, renewer: Arc<dyn TokenRenewer>) -> Self {
        self.renewer = Some(renewer);
        self
    }

    /// Share an existing coordinator instead of creating one
    ///
    /// Takes precedence over the renewer, listener and renewal settings.
    pub fn coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` when the base URL is missing or a
    /// path does not start with `/`, and `ClientError::Request` when the
    /// underlying HTTP client cannot be created
    pub fn build(self) -> Result<SessionClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let graphql_path = self.graphql_path.unwrap_or_else(|| "/graphql".to_string());
        let renewal_path = self
            .renewal_path
            .unwrap_or_else(|| "/auth/refresh".to_string());
        for path in [&graphql_path, &renewal_path] {
            if !path.starts_with('/') {
                return Err(ClientError::Configuration(format!(
                    "path '{path}' must start with '/'"
                )));
            }
        }

        let mut client_builder = ClientBuilder::new().cookie_store(true);
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }
        client_builder =
            client_builder.user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
        let client = client_builder.build()?;

        let coordinator = match self.coordinator {
            Some(coordinator) => coordinator,
            None => {
                let renewer = self.renewer.unwrap_or_else(|| {
                    Arc::new(HttpRenewer::new(
                        client.clone(),
                        format!("{base_url}{renewal_path}"),
                        self.renewal_mutation,
                    ))
                });
                let mut coordinator = RefreshCoordinator::new(renewer);
                if let Some(listener) = self.session_listener {
                    coordinator = coordinator.with_session_listener(listener);
                }
                if let Some(timeout) = self.renewal_timeout {
                    coordinator = coordinator.with_renewal_timeout(timeout);
                }
                Arc::new(coordinator)
            }
        };

        debug!(%base_url, "Built session client");

        Ok(SessionClient {
            client,
            base_url,
            api_key: self.api_key,
            graphql_path,
            coordinator,
        })
    }
}
