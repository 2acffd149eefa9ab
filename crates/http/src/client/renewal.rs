//! Session renewal exchange

use super::error::RenewalError;
use super::graphql::{GraphQlRequest, GraphQlResponse};
use async_trait::async_trait;
use serde_json::Value;

/// Performs one renewal exchange
///
/// Credentials travel with the transport (cookies), so the exchange takes no
/// input and only reports whether a fresh session was issued.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    async fn renew(&self) -> Result<(), RenewalError>;
}

/// Renews the session by calling the API's refresh endpoint
///
/// Shares the `reqwest::Client` (and its cookie store) with the requests it
/// renews for, so rotated cookies are picked up by the replays.
#[derive(Clone, Debug)]
pub struct HttpRenewer {
    client: reqwest::Client,
    url: String,
    mutation: Option<String>,
}

impl HttpRenewer {
    /// Renew with `POST url`; when `mutation` is set it is sent as a GraphQL
    /// document and the response's `errors` array is checked as well
    pub fn new(client: reqwest::Client, url: impl Into<String>, mutation: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            mutation,
        }
    }

    /// Refresh endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenRenewer for HttpRenewer {
    async fn renew(&self) -> Result<(), RenewalError> {
        let mut request = self.client.post(&self.url);
        if let Some(mutation) = &self.mutation {
            request = request.json(&GraphQlRequest::<Value>::new(mutation.as_str()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RenewalError::Transport(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        if self.mutation.is_some() {
            let body: GraphQlResponse<Value> = response
                .json()
                .await
                .map_err(|e| RenewalError::Transport(e.to_string()))?;
            if let Some(err) = body.errors.first() {
                return Err(RenewalError::Rejected {
                    status: status.as_u16(),
                    message: err.message.clone(),
                });
            }
        }

        trace!(url = %self.url, "Refresh endpoint accepted the session");
        Ok(())
    }
}
