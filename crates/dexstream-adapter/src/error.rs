/*
[INPUT]:  Error sources (WebSocket, HTTP, serialization, frame decoding, config)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use std::time::Duration;

use thiserror::Error;

use crate::types::Method;

/// Main error type for the dexstream adapter
#[derive(Error, Debug)]
pub enum DexstreamError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Snapshot endpoint answered with a non-success status
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Inbound frame could not be parsed as an envelope
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Subscription content did not match the shape expected for its method
    #[error("Payload for {method:?} rejected: {reason}")]
    PayloadShape { method: Method, reason: String },

    /// Integer on the wire does not map to a known enum value
    #[error("Unknown {kind} value {value}")]
    UnknownEnumValue { kind: &'static str, value: i32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection timeout
    #[error("Connection timeout after {duration:?}")]
    Timeout { duration: Duration },
}

impl DexstreamError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DexstreamError::Http(_) | DexstreamError::Timeout { .. } | DexstreamError::WebSocket(_)
        )
    }

    /// Errors that concern a single inbound frame and never the connection.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            DexstreamError::MalformedFrame(_)
                | DexstreamError::PayloadShape { .. }
                | DexstreamError::Serialization(_)
                | DexstreamError::UnknownEnumValue { .. }
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        DexstreamError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DexstreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        DexstreamError::WebSocket(err.to_string())
    }
}

/// Result type alias for dexstream operations
pub type Result<T> = std::result::Result<T, DexstreamError>;
