//! Error types for the Lambda Cloud API client.

use thiserror::Error;

/// Errors raised while talking to the Lambda Cloud API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when no API key was configured.
    #[error("missing API key: set LAMBDA_API_KEY or pass --api-key")]
    MissingApiKey,
    /// Raised when the request never produced an HTTP response.
    #[error("{method} {path} failed: {message}")]
    Transport {
        /// HTTP method.
        method: String,
        /// Request path relative to the API base URL.
        path: String,
        /// Message from the HTTP client.
        message: String,
    },
    /// Raised for non-2xx responses.
    #[error("{method} {path} returned HTTP {status}{}: {message}", code_suffix(.code))]
    Status {
        /// HTTP method.
        method: String,
        /// Request path relative to the API base URL.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Structured error code, when the body carried one.
        code: Option<String>,
        /// Structured message or truncated raw body.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode response from {path}: {message}")]
    Decode {
        /// Request path relative to the API base URL.
        path: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when a payload was expected but the body was empty.
    #[error("empty response body from {path}")]
    EmptyBody {
        /// Request path relative to the API base URL.
        path: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|value| format!(" ({value})"))
        .unwrap_or_default()
}
