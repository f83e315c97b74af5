//! One-shot HTTP transport.
//!
//! Connectionless: every call issues its own request. Because a request's
//! completion can race its registration (they run on different tasks), the
//! transport keeps its own handle-to-correlation map, guarded independently
//! of the event bridge. Registration happens strictly before dispatch;
//! a completion that finds no registration was cancelled in flight and its
//! response is dropped.

use crate::bridge::EventBridge;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{DisconnectInfo, InboundEvent};
use crate::ledger::CorrelationId;
use crate::transport::Transport;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP-backed [`Transport`].
pub struct HttpTransport {
    bridge: Arc<EventBridge>,
    http: reqwest::Client,
    url: String,
    auth_header: String,
    /// Requests in flight, keyed by a transport-local handle.
    pending: Arc<DashMap<u64, CorrelationId>>,
    next_request: AtomicU64,
    open: AtomicBool,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, bridge: Arc<EventBridge>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let auth_header = format!(
            "Basic {}",
            BASE64.encode(format!("{}:", config.server_key))
        );
        Ok(Self {
            bridge,
            http,
            url: config.http_url(),
            auth_header,
            pending: Arc::new(DashMap::new()),
            next_request: AtomicU64::new(1),
            open: AtomicBool::new(false),
        })
    }

}

impl Transport for HttpTransport {
    fn connect(&self) {
        // Connectionless: establishment is acknowledged immediately.
        if !self.open.swap(true, Ordering::SeqCst) {
            self.bridge.enqueue(InboundEvent::Connected);
        }
    }

    fn send(&self, bytes: Vec<u8>, correlation_id: Option<CorrelationId>) -> Result<(), ClientError> {
        let request_id = self.next_request.fetch_add(1, Ordering::SeqCst);
        // Register before dispatch so the completion always finds its entry.
        if let Some(cid) = correlation_id {
            self.pending.insert(request_id, cid);
        }
        debug!("📤 Dispatching request {request_id} to {}", self.url);

        let request = self
            .http
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes);
        let bridge = self.bridge.clone();
        let pending = self.pending.clone();
        let correlated = correlation_id.is_some();

        tokio::spawn(async move {
            let outcome = request.send().await;
            let cid = pending.remove(&request_id).map(|(_, cid)| cid);
            if correlated && cid.is_none() {
                warn!(
                    "⚠️ Completed request {request_id} has no matching registration; dropping response"
                );
                return;
            }
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    match response.bytes().await {
                        // Error bodies are enqueued too: a server-reported
                        // failure rides a successful transport exchange.
                        Ok(body) => bridge.enqueue(InboundEvent::Data {
                            bytes: body.to_vec(),
                            correlation_id: cid,
                        }),
                        Err(e) => bridge.enqueue(InboundEvent::Error {
                            message: format!("{status}: {e}"),
                            correlation_id: cid,
                        }),
                    }
                }
                Err(e) => bridge.enqueue(InboundEvent::Error {
                    message: e.to_string(),
                    correlation_id: cid,
                }),
            }
        });
        Ok(())
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            debug!("Close ignored: transport already closed");
            return;
        }
        // Cancel everything still tracked. Completions that arrive after
        // this find no registration and are dropped.
        let cancelled: Vec<(u64, CorrelationId)> = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        self.pending.clear();
        for (request_id, cid) in cancelled {
            debug!("Cancelling request {request_id}");
            self.bridge.enqueue(InboundEvent::Error {
                message: "request cancelled".to_string(),
                correlation_id: Some(cid),
            });
        }
        self.bridge
            .enqueue(InboundEvent::Disconnected(DisconnectInfo::clean(
                "transport closed",
            )));
    }

    fn is_connectionless(&self) -> bool {
        true
    }
}
