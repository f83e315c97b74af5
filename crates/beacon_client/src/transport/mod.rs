//! Pluggable transport adapters.
//!
//! A transport is the only component allowed to touch its underlying
//! network library. All completion reporting happens through the event
//! bridge: transports never invoke user code and never decide how to react
//! to a failure.

pub mod http;
pub mod websocket;

use crate::bridge::EventBridge;
use crate::config::{ClientConfig, TransportKind};
use crate::error::ClientError;
use crate::ledger::CorrelationId;
use std::sync::Arc;

pub use http::HttpTransport;
pub use websocket::WebSocketTransport;

/// The capability every transport implements.
///
/// None of these operations block: establishment, delivery, and teardown
/// outcomes all surface as events on the bridge.
pub trait Transport: Send + Sync {
    /// Starts connection establishment. The outcome arrives on the bridge
    /// as `Connected`, or as `Error` followed by `Disconnected`; network
    /// failures are never raised synchronously.
    fn connect(&self);

    /// Hands off one encoded request. For correlated calls the id the
    /// response should be tagged with is supplied alongside the bytes.
    fn send(&self, bytes: Vec<u8>, correlation_id: Option<CorrelationId>)
        -> Result<(), ClientError>;

    /// Tears the connection down. Idempotent: no further `Data` or
    /// `Connected` events are enqueued afterwards, but the terminal
    /// `Disconnected` event for the close itself is still delivered,
    /// exactly once.
    fn close(&self);

    /// Hook for transports whose underlying library needs manual pumping
    /// once per tick. The tokio-backed transports are serviced by the
    /// runtime and leave this empty.
    fn tick(&self) {}

    /// Whether calls may be issued regardless of connection state (true
    /// for the one-shot HTTP transport, which is connectionless per call).
    fn is_connectionless(&self) -> bool {
        false
    }
}

/// Builds the transport selected by the configuration.
pub(crate) fn build(
    config: &ClientConfig,
    bridge: Arc<EventBridge>,
) -> Result<Box<dyn Transport>, ClientError> {
    match config.transport {
        TransportKind::WebSocket => Ok(Box::new(WebSocketTransport::new(config.clone(), bridge))),
        TransportKind::Http => Ok(Box::new(HttpTransport::new(config, bridge)?)),
    }
}
