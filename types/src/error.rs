//! Terminal failure kinds surfaced through a delta sink.
//!
//! Malformed individual records never reach this level; they are counted and
//! logged by the decoder. User cancellation is not an error either: it is a
//! distinct terminal outcome.

use thiserror::Error;

/// Failure reported by an injected transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The endpoint answered with a non-success status.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    /// The connection could not be established or broke mid-stream.
    #[error("network error: {0}")]
    Connection(String),
    /// The event channel closed without a completion event.
    #[error("connection closed before stream completed")]
    Closed,
}

impl TransportFailure {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Connection(_) | Self::Closed => None,
        }
    }
}

/// Failure that terminates a generation session. Reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no response received from model")]
    NoResponse,
    #[error("stream idle timeout: no data received")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

impl GenerationError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
