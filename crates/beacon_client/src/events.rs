//! Inbound event model shared by the transports and the tick consumer.

use crate::ledger::CorrelationId;
use serde::{Deserialize, Serialize};

/// A single event produced by a transport's I/O task and consumed by the
/// tick loop.
///
/// `Data` carries a correlation id only when the transport itself knows the
/// originating call (the one-shot HTTP transport tags responses with the id
/// supplied at send time). Frames arriving over the persistent socket carry
/// `None` here; their correlation id, if any, lives inside the payload and
/// is discovered at decode time.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// The connection was established.
    Connected,
    /// The connection reached its terminal state. Emitted exactly once per
    /// connection, for clean and unclean teardown alike.
    Disconnected(DisconnectInfo),
    /// A transport-level failure. Carries the correlation id of the
    /// affected call when one is known.
    Error {
        message: String,
        correlation_id: Option<CorrelationId>,
    },
    /// A payload received from the server.
    Data {
        bytes: Vec<u8>,
        correlation_id: Option<CorrelationId>,
    },
}

/// Details of a connection teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    /// Close code reported by the transport (WebSocket close code, or a
    /// synthetic 1000/1006 for transports without one).
    pub code: u16,
    /// Human-readable reason, possibly empty.
    pub reason: String,
    /// Whether the teardown completed a proper close handshake.
    pub was_clean: bool,
}

impl DisconnectInfo {
    /// Info for a locally initiated, orderly close.
    pub fn clean(reason: impl Into<String>) -> Self {
        Self {
            code: 1000,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Info for an abnormal teardown (peer vanished, I/O failure).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: 1006,
            reason: reason.into(),
            was_clean: false,
        }
    }
}
