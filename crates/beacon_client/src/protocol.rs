//! Wire envelope and push-event payloads.
//!
//! The core treats outgoing request bytes as opaque; this module defines
//! the envelope the client's own protocol layer uses to embed a correlation
//! id and to decode what the server sends back. Inbound frames are either
//! a correlated response (the envelope echoes the request's `cid`), a
//! server-pushed event with no `cid`, or a heartbeat.

use crate::error::ClientError;
use crate::ledger::CorrelationId;
use serde::{Deserialize, Serialize};

/// Envelope wrapping every message exchanged with the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id; present on correlated requests and their responses,
    /// absent on push events. An envelope with a `cid` but no `msg` is an
    /// empty acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<CorrelationId>,
    /// The payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Payload>,
}

impl Envelope {
    /// Builds a correlated request envelope.
    pub fn request(cid: CorrelationId, payload: Payload) -> Self {
        Self {
            cid: Some(cid),
            msg: Some(payload),
        }
    }

    /// Encodes the envelope to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        // Serialization of these derive-only types cannot fail.
        serde_json::to_vec(self).expect("envelope serialization")
    }

    /// Decodes wire bytes into an envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, ClientError> {
        serde_json::from_slice(bytes).map_err(|e| ClientError::ProtocolDecode(e.to_string()))
    }
}

/// Message payloads, adjacently tagged on the wire as
/// `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Periodic server heartbeat carrying the authoritative server time.
    Heartbeat { timestamp_ms: i64 },
    /// A server-reported failure, correlated or broadcast.
    Error { code: i32, message: String },
    /// Users joining or leaving a match or channel.
    Presence(PresenceUpdate),
    /// A message posted to a chat channel.
    ChannelMessage(ChannelMessage),
    /// Opaque realtime match payload relayed between participants.
    MatchData(MatchData),
    /// The matchmaker found a match for an outstanding ticket.
    MatchmakerMatched(MatchmakerMatched),
    /// A server notification addressed to this user.
    Notification(Notification),
    /// Generic correlated result payload.
    Result(serde_json::Value),
}

impl Payload {
    /// Converts a payload into a push event, if it is one of the
    /// server-pushed kinds.
    pub fn into_push(self) -> Option<PushEvent> {
        match self {
            Payload::Presence(p) => Some(PushEvent::Presence(p)),
            Payload::ChannelMessage(m) => Some(PushEvent::ChannelMessage(m)),
            Payload::MatchData(d) => Some(PushEvent::MatchData(d)),
            Payload::MatchmakerMatched(m) => Some(PushEvent::MatchmakerMatched(m)),
            Payload::Notification(n) => Some(PushEvent::Notification(n)),
            _ => None,
        }
    }
}

/// One user's presence on a match or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: String,
    pub session_id: String,
    pub username: String,
}

/// Presence delta for a match or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PresenceUpdate {
    /// Match or channel the update applies to.
    pub source_id: String,
    pub joins: Vec<UserPresence>,
    pub leaves: Vec<UserPresence>,
}

/// A chat message delivered on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub username: String,
    pub content: String,
}

/// Opaque match payload with an application-defined op code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchData {
    pub match_id: String,
    pub op_code: i64,
    pub data: serde_json::Value,
}

/// Matchmaker result for a previously submitted ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerMatched {
    pub ticket: String,
    pub match_id: String,
    pub users: Vec<UserPresence>,
}

/// A server notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub subject: String,
    pub content: serde_json::Value,
    pub persistent: bool,
}

/// A decoded server-pushed event, fanned out to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Presence(PresenceUpdate),
    ChannelMessage(ChannelMessage),
    MatchData(MatchData),
    MatchmakerMatched(MatchmakerMatched),
    Notification(Notification),
}

impl PushEvent {
    /// The kind handlers subscribe under.
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::Presence(_) => PushEventKind::Presence,
            PushEvent::ChannelMessage(_) => PushEventKind::ChannelMessage,
            PushEvent::MatchData(_) => PushEventKind::MatchData,
            PushEvent::MatchmakerMatched(_) => PushEventKind::MatchmakerMatched,
            PushEvent::Notification(_) => PushEventKind::Notification,
        }
    }
}

/// The kinds of server-pushed events a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEventKind {
    Presence,
    ChannelMessage,
    MatchData,
    MatchmakerMatched,
    Notification,
}
