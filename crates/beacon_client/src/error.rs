//! Error types for the client core.
//!
//! All per-call failures travel through the same channel a successful result
//! would have used, so callers never need a second error-handling path.
//! Connection-level failures additionally reach the lifecycle subscribers.

use crate::ledger::CorrelationId;
use thiserror::Error;

/// Errors surfaced by the client core.
///
/// The taxonomy distinguishes failures of the underlying network stack
/// ([`ClientError::Transport`]) from failures the server itself reported
/// ([`ClientError::Application`]) and from outcomes synthesized locally
/// (timeouts, cancelled calls on disconnect).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Underlying socket or HTTP failure (connection refused, TLS failure,
    /// DNS failure). Also delivered to lifecycle subscribers.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server responded, but the response encodes a business-level
    /// failure (e.g. authentication rejected).
    #[error("server error {code}: {message}")]
    Application { code: i32, message: String },

    /// Synthesized for every call still outstanding when the connection
    /// goes down.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Synthesized by the caller-side deadline layer, never by the
    /// transports themselves.
    #[error("call timed out")]
    TimedOut,

    /// A payload could not be decoded. The offending message is dropped;
    /// the connection stays up.
    #[error("malformed payload: {0}")]
    ProtocolDecode(String),

    /// A correlation id was registered twice. ID generation guarantees
    /// uniqueness, so this indicates a programming error rather than a
    /// recoverable condition.
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelationId(CorrelationId),

    /// An operation that requires an established connection was attempted
    /// while the socket was not connected.
    #[error("socket is not connected")]
    NotConnected,
}

impl ClientError {
    /// Whether this error describes a connection-level condition (as opposed
    /// to a per-call one).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::ConnectionClosed(_) | ClientError::NotConnected
        )
    }
}
