//! Failure taxonomy for fetch and stream ingestion paths.

use thiserror::Error;

/// Error for any caller-supplied request or payload validation failure.
///
/// Stored on list state when a page fetch fails, so it is `Clone`; the
/// original transport error is flattened to a message at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transient transport failure. Retry is caller policy, never automatic.
    #[error("network failure: {0}")]
    Network(String),

    /// 401: the session is no longer valid.
    #[error("unauthorized")]
    Unauthorized,

    /// 403: the server refused this resource (for example a block).
    #[error("forbidden")]
    Forbidden,

    /// The payload did not match the entity's expected shape.
    #[error("invalid payload: {0}")]
    Validation(String),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, FetchError::Forbidden)
    }

    /// Classify an HTTP status code, for transports that surface one.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 => FetchError::Unauthorized,
            403 => FetchError::Forbidden,
            _ => FetchError::Network(message.into()),
        }
    }
}

/// Error decoding a pushed stream frame. Never fatal to the dispatcher;
/// the offending frame is dropped and the connection keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("malformed frame envelope: {0}")]
    Envelope(String),

    #[error("malformed payload for {event}: {message}")]
    Payload { event: String, message: String },
}
