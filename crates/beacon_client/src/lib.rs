//! # Beacon Client Core
//!
//! Realtime transport and request/response correlation engine for the
//! Beacon game backend. This crate owns the connection plumbing — sockets,
//! correlation ids, event bridging — and nothing else: encoding specific
//! API calls and binding them into a host engine belong to the layers
//! above.
//!
//! ## Architecture Overview
//!
//! * **EventBridge** - Thread-safe FIFO queue moving transport I/O events
//!   onto the consumer thread
//! * **CorrelationLedger** - Single source of truth for calls awaiting a
//!   response, keyed by correlation id
//! * **Transport** - Pluggable adapters over the network stack (persistent
//!   WebSocket, one-shot HTTP)
//! * **MessageRouter** - Classifies drained events into correlated
//!   responses, push events and lifecycle signals
//! * **Client** - The facade composing all of the above around a single
//!   `tick()` pump
//!
//! ## Message Flow
//!
//! 1. The caller issues [`Client::send`]; a fresh [`CorrelationId`] is
//!    registered and embedded into the outgoing bytes
//! 2. The transport's I/O task carries the request and enqueues whatever
//!    comes back (data, errors, lifecycle changes) on the bridge
//! 3. The embedding application calls [`Client::tick`] once per frame
//! 4. The router resolves correlated responses against the ledger and fans
//!    push events out to subscribers, lifecycle first
//!
//! Results surface through the [`CallHandle`] returned by `send`; nothing
//! in the core ever blocks the calling thread.
//!
//! ## Threading Model
//!
//! Exactly two roles exist: the transports' I/O tasks (which only write to
//! the bridge and to transport-local request maps) and the single consumer
//! thread calling `tick()` (which owns every state mutation and every user
//! callback). No lock is held while user code runs.
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use beacon_client::{Client, ClientConfig, ConnectionState, Payload, PushEventKind};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), beacon_client::ClientError> {
//! let client = Client::new(ClientConfig::default())?;
//!
//! client.on_connected(|| println!("connected"));
//! client.subscribe(PushEventKind::ChannelMessage, |event| {
//!     println!("push: {event:?}");
//! });
//!
//! client.connect();
//! let mut status = None;
//!
//! // Once per frame / loop iteration:
//! loop {
//!     client.tick();
//!     if status.is_none() && client.state() == ConnectionState::Connected {
//!         status = Some(client.send_request(Payload::Result(json!({"op": "status"})))?);
//!     }
//!     if let Some(result) = status.as_mut().and_then(|call| call.try_result()) {
//!         println!("status: {result:?}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use client::{CallHandle, Client, ConnectionState};
pub use config::{ClientConfig, TransportKind};
pub use error::ClientError;
pub use events::{DisconnectInfo, InboundEvent};
pub use ledger::{CallResult, CorrelationId};
pub use protocol::{
    ChannelMessage, Envelope, MatchData, MatchmakerMatched, Notification, Payload, PresenceUpdate,
    PushEvent, PushEventKind, UserPresence,
};
pub use subscriptions::SubscriptionHandle;
pub use transport::Transport;

pub mod config;
pub mod error;
pub mod protocol;

mod bridge;
mod client;
mod events;
mod ledger;
mod router;
mod subscriptions;
mod transport;
