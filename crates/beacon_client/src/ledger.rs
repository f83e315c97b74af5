//! Correlation ledger: the single source of truth for in-flight calls.
//!
//! Every outgoing correlated call registers its id here and receives the
//! sending half of a oneshot channel in return. Resolution removes the
//! entry *before* the channel fires, so a call observing its own result can
//! immediately issue follow-up calls without ever seeing (or corrupting)
//! its still-pending entry, and a duplicate response for the same id finds
//! nothing to fire.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque token linking one outgoing request to its single eventual
/// response. Generated per call, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a correlated call: the decoded result payload, or the error
/// that ended it.
pub type CallResult = Result<serde_json::Value, ClientError>;

/// A registered call awaiting its response.
struct PendingCall {
    sender: oneshot::Sender<CallResult>,
    created_at: Instant,
}

/// Mapping from correlation id to the call awaiting that response.
///
/// Mutating operations run only on the consumer thread (after the bridge
/// drain); the internal mutex exists so the ledger can be shared with the
/// facade, and is never held while user code runs.
#[derive(Default)]
pub struct CorrelationLedger {
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
}

impl CorrelationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns the receiving half of its result channel.
    ///
    /// Fails with [`ClientError::DuplicateCorrelationId`] if the id is
    /// already tracked. Generation guarantees uniqueness, so a duplicate is
    /// a programming error, not a condition to recover from.
    pub fn register(&self, id: CorrelationId) -> Result<oneshot::Receiver<CallResult>, ClientError> {
        let (sender, receiver) = oneshot::channel();
        let mut calls = self.calls.lock().unwrap();
        if calls.contains_key(&id) {
            return Err(ClientError::DuplicateCorrelationId(id));
        }
        calls.insert(
            id,
            PendingCall {
                sender,
                created_at: Instant::now(),
            },
        );
        Ok(receiver)
    }

    /// Resolves `id` with a successful payload. Returns whether a pending
    /// call was found.
    ///
    /// An unknown id is logged and discarded: the transport cannot
    /// guarantee at-most-once delivery, so a late or duplicate response is
    /// expected traffic, not an error.
    pub fn resolve(&self, id: &CorrelationId, value: serde_json::Value) -> bool {
        match self.take(id) {
            Some(call) => {
                debug!(
                    "Resolved call {} after {:?}",
                    id,
                    call.created_at.elapsed()
                );
                let _ = call.sender.send(Ok(value));
                true
            }
            None => {
                warn!("⚠️ No pending call for response {id}; dropping");
                false
            }
        }
    }

    /// Fails `id` with `error`. Same removal semantics as [`resolve`].
    ///
    /// [`resolve`]: CorrelationLedger::resolve
    pub fn fail(&self, id: &CorrelationId, error: ClientError) -> bool {
        match self.take(id) {
            Some(call) => {
                let _ = call.sender.send(Err(error));
                true
            }
            None => {
                debug!("No pending call for failure {id}; dropping");
                false
            }
        }
    }

    /// Atomically removes every remaining entry and fails each with
    /// [`ClientError::ConnectionClosed`] carrying `reason`. No entry
    /// survives this call.
    pub fn drain_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingCall> = {
            let mut calls = self.calls.lock().unwrap();
            calls.drain().map(|(_, call)| call).collect()
        };
        let count = drained.len();
        if count > 0 {
            debug!("Failing {count} outstanding call(s): {reason}");
        }
        for call in drained {
            let _ = call
                .sender
                .send(Err(ClientError::ConnectionClosed(reason.to_string())));
        }
        count
    }

    /// Removes `id` without firing its channel. Used when a send fails
    /// before the call ever went out.
    pub(crate) fn discard(&self, id: &CorrelationId) {
        self.take(id);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    fn take(&self, id: &CorrelationId) -> Option<PendingCall> {
        self.calls.lock().unwrap().remove(id)
    }
}
