//! Error types for quill-ai

use thiserror::Error;

/// Result type alias using quill-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with LLM providers
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid provider configuration. Raised before any network
    /// call is made.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider returned a non-200 response. Fatal for the current turn;
    /// the response body is preserved for the operator.
    #[error("Provider HTTP error (status {status}): {body}")]
    Http { status: u16, body: String },

    /// Transport-level request failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server-sent events framing error
    #[error("SSE error: {0}")]
    Sse(String),

    /// JSON serialization/deserialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider sent a response we could not interpret (embedded error
    /// objects, unexpected body shapes)
    #[error("Unexpected provider response: {0}")]
    Protocol(String),
}

impl Error {
    /// Build an HTTP error from a status code and response body.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }
}
