//! Classification and dispatch of drained inbound events.
//!
//! Each tick hands the router one batch of events. Lifecycle events
//! (connected, disconnected, transport errors) are processed before any
//! data in the same batch, so data handlers always observe a consistent
//! connection state. Data events are then split into correlated responses
//! (resolved against the ledger) and server-pushed events (fanned out to
//! subscribers).

use crate::client::ConnectionState;
use crate::error::ClientError;
use crate::events::InboundEvent;
use crate::ledger::{CorrelationId, CorrelationLedger};
use crate::protocol::{Envelope, Payload};
use crate::subscriptions::SubscriptionRegistry;
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub(crate) struct MessageRouter {
    ledger: Arc<CorrelationLedger>,
    subscriptions: Arc<SubscriptionRegistry>,
    state: Arc<AtomicCell<ConnectionState>>,
    /// Highest server timestamp observed via heartbeats; 0 until the first
    /// heartbeat arrives. Never moves backwards.
    server_time_ms: AtomicI64,
}

impl MessageRouter {
    pub fn new(
        ledger: Arc<CorrelationLedger>,
        subscriptions: Arc<SubscriptionRegistry>,
        state: Arc<AtomicCell<ConnectionState>>,
    ) -> Self {
        Self {
            ledger,
            subscriptions,
            state,
            server_time_ms: AtomicI64::new(0),
        }
    }

    /// Routes one drained batch: lifecycle first, then data.
    pub fn route_batch(&self, batch: Vec<InboundEvent>) {
        let (lifecycle, data): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|event| !matches!(event, InboundEvent::Data { .. }));

        for event in lifecycle {
            self.route_lifecycle(event);
        }
        for event in data {
            if let InboundEvent::Data {
                bytes,
                correlation_id,
            } = event
            {
                self.route_data(&bytes, correlation_id);
            }
        }
    }

    /// Server time watermark in milliseconds; 0 if no heartbeat was seen.
    pub fn server_time_ms(&self) -> i64 {
        self.server_time_ms.load(Ordering::Relaxed)
    }

    fn route_lifecycle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Connected => {
                info!("🔌 Connection established");
                self.state.store(ConnectionState::Connected);
                self.subscriptions.notify_connected();
            }
            InboundEvent::Disconnected(details) => {
                info!(
                    "🔌 Disconnected (code {}, clean: {}): {}",
                    details.code, details.was_clean, details.reason
                );
                self.state.store(ConnectionState::Disconnected);
                let reason = if details.reason.is_empty() {
                    "connection closed"
                } else {
                    &details.reason
                };
                let orphaned = self.ledger.drain_all(reason);
                if orphaned > 0 {
                    debug!("{orphaned} call(s) failed by disconnect");
                }
                self.subscriptions.clear_push();
                self.subscriptions.notify_disconnected(&details);
            }
            InboundEvent::Error {
                message,
                correlation_id,
            } => {
                // Transport warnings do not change the connection state; a
                // Disconnected event follows if the connection is actually
                // gone.
                warn!("⚠️ Transport error: {message}");
                if let Some(id) = correlation_id {
                    self.ledger.fail(&id, ClientError::Transport(message.clone()));
                }
                self.subscriptions.notify_transport_error(&message);
            }
            InboundEvent::Data { .. } => unreachable!("data events are routed separately"),
        }
    }

    fn route_data(&self, bytes: &[u8], transport_cid: Option<CorrelationId>) {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(error) => {
                // One bad message never tears the connection down.
                warn!("⚠️ Dropping malformed message: {error}");
                if let Some(id) = transport_cid {
                    self.ledger.fail(&id, error.clone());
                }
                self.subscriptions.notify_transport_error(&error.to_string());
                return;
            }
        };
        let correlation_id = transport_cid.or(envelope.cid);

        match envelope.msg {
            Some(Payload::Heartbeat { timestamp_ms }) => {
                // Server time never goes backwards.
                self.server_time_ms.fetch_max(timestamp_ms, Ordering::Relaxed);
                trace!("Heartbeat: server time {timestamp_ms}");
            }
            Some(Payload::Error { code, message }) => {
                let error = ClientError::Application { code, message };
                match correlation_id {
                    Some(id) if self.ledger.fail(&id, error.clone()) => {}
                    // Server errors nobody is waiting on are broadcast.
                    _ => self.subscriptions.notify_transport_error(&error.to_string()),
                }
            }
            Some(Payload::Result(value)) => match correlation_id {
                Some(id) => {
                    self.ledger.resolve(&id, value);
                }
                None => warn!("⚠️ Uncorrelated result payload; dropping"),
            },
            Some(payload) => {
                // The remaining payloads are all server-pushed kinds.
                if let Some(push) = payload.into_push() {
                    self.subscriptions.dispatch_push(&push);
                }
            }
            // An envelope with a correlation id and no payload is an empty
            // acknowledgement and resolves the call successfully.
            None => match correlation_id {
                Some(id) => {
                    self.ledger.resolve(&id, serde_json::Value::Null);
                }
                None => trace!("Dropping empty uncorrelated message"),
            },
        }
    }
}
