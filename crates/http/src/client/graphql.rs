//! GraphQL request and response envelopes

use super::error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code the API uses for missing or expired credentials
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// GraphQL request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest<V = Value> {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<V>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl<V> GraphQlRequest<V> {
    /// Request without variables
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Attach variables
    pub fn variables(mut self, variables: V) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Name the operation to run when the document holds several
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// GraphQL response body
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// A single entry of the `errors` array
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<Value>>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    /// `extensions.code`, when present
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

impl<T> GraphQlResponse<T> {
    /// Convert the envelope into the payload or a client error
    ///
    /// An `UNAUTHENTICATED` error anywhere in the response maps to
    /// `ClientError::AuthenticationFailed`, the same as an HTTP 401.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carried errors or no data
    pub fn into_result(self) -> Result<T, ClientError> {
        if let Some(err) = self
            .errors
            .iter()
            .find(|err| err.code() == Some(UNAUTHENTICATED))
        {
            return Err(ClientError::AuthenticationFailed(err.message.clone()));
        }

        if !self.errors.is_empty() {
            return Err(ClientError::GraphQl {
                messages: self.errors.into_iter().map(|err| err.message).collect(),
            });
        }

        self.data.ok_or_else(|| ClientError::GraphQl {
            messages: vec!["response contained no data".to_string()],
        })
    }
}
