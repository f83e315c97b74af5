//! Client facade: composition of transport, ledger, router and
//! subscriptions, plus the tick pump the embedding application drives.
//!
//! # Threading
//!
//! The client introduces no threads of its own beyond the transport I/O
//! tasks. Exactly one thread — whichever calls [`Client::tick`] — observes
//! results, push events and state changes. `send` never blocks; the
//! returned [`CallHandle`] completes on a later tick.

use crate::bridge::EventBridge;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{DisconnectInfo, InboundEvent};
use crate::ledger::{CallResult, CorrelationId, CorrelationLedger};
use crate::protocol::{Envelope, Payload, PushEvent, PushEventKind};
use crate::router::MessageRouter;
use crate::subscriptions::{SubscriptionHandle, SubscriptionRegistry};
use crate::transport::{self, Transport};
use crossbeam::atomic::AtomicCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Connection lifecycle states.
///
/// Transitions are driven by `connect()`/`disconnect()` calls and by
/// lifecycle events delivered through the tick loop — never by the I/O
/// tasks directly — so every observer sees state changes in one consistent
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// The eventual result of a correlated call.
///
/// Completes on whichever tick observes the response (or the failure that
/// ended the call). Can be awaited, or polled cheaply from a tick-driven
/// loop with [`CallHandle::try_result`].
#[derive(Debug)]
pub struct CallHandle {
    id: CorrelationId,
    receiver: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    /// The id this call was registered under.
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    /// Returns the result if it has arrived, without blocking.
    pub fn try_result(&mut self) -> Option<CallResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::ConnectionClosed(
                "client dropped".to_string(),
            ))),
        }
    }
}

impl Future for CallHandle {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionClosed("client dropped".to_string())),
        })
    }
}

/// Facade over one connection to the backend.
pub struct Client {
    config: ClientConfig,
    bridge: Arc<EventBridge>,
    ledger: Arc<CorrelationLedger>,
    subscriptions: Arc<SubscriptionRegistry>,
    router: MessageRouter,
    transport: Box<dyn Transport>,
    state: Arc<AtomicCell<ConnectionState>>,
    /// Caller-side deadlines, swept at the end of each tick.
    deadlines: Mutex<Vec<(Instant, CorrelationId)>>,
}

impl Client {
    /// Builds a client for the configured endpoint and transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let bridge = Arc::new(EventBridge::new());
        let transport = transport::build(&config, bridge.clone())?;
        Ok(Self::assemble(config, bridge, transport))
    }

    fn assemble(
        config: ClientConfig,
        bridge: Arc<EventBridge>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let ledger = Arc::new(CorrelationLedger::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let state = Arc::new(AtomicCell::new(ConnectionState::Disconnected));
        let router = MessageRouter::new(ledger.clone(), subscriptions.clone(), state.clone());
        Self {
            config,
            bridge,
            ledger,
            subscriptions,
            router,
            transport,
            state,
            deadlines: Mutex::new(Vec::new()),
        }
    }

    /// Starts connection establishment. The outcome surfaces on a later
    /// tick as a `Connected` lifecycle notification, or as a transport
    /// error followed by a disconnect.
    pub fn connect(&self) {
        match self.state.load() {
            ConnectionState::Disconnected => {
                info!("🚀 Connecting ({}:{})", self.config.host, self.config.port);
                self.state.store(ConnectionState::Connecting);
                self.transport.connect();
            }
            state => warn!("⚠️ Connect ignored in state {state:?}"),
        }
    }

    /// Starts an orderly teardown. Every call still outstanding when the
    /// terminal disconnect is processed receives a connection-closed
    /// failure; push subscriptions are cleared afterwards.
    pub fn disconnect(&self) {
        match self.state.load() {
            ConnectionState::Disconnected => debug!("Disconnect ignored: already disconnected"),
            ConnectionState::Closing => debug!("Disconnect ignored: already closing"),
            _ => {
                info!("👋 Disconnecting");
                self.state.store(ConnectionState::Closing);
                self.transport.close();
            }
        }
    }

    /// Issues a correlated call.
    ///
    /// A fresh [`CorrelationId`] is generated and handed to `encode`, which
    /// must embed it into the request bytes wherever the server expects it.
    /// On the persistent transport this requires an established connection;
    /// the one-shot HTTP transport accepts calls in any state.
    pub fn send<F>(&self, encode: F) -> Result<CallHandle, ClientError>
    where
        F: FnOnce(CorrelationId) -> Vec<u8>,
    {
        if !self.transport.is_connectionless() && self.state.load() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let id = CorrelationId::new();
        let receiver = self.ledger.register(id)?;
        if let Err(e) = self.transport.send(encode(id), Some(id)) {
            // The call never went out; don't track it.
            self.ledger.discard(&id);
            return Err(e);
        }
        Ok(CallHandle { id, receiver })
    }

    /// Like [`send`], with a caller-side deadline.
    ///
    /// If no response has consumed the id when the deadline passes, the
    /// call fails with [`ClientError::TimedOut`] on the next tick. The
    /// deadline sweep runs after the tick's event batch, so a response
    /// arriving in the same tick wins the race; the losing side is a
    /// silent no-op.
    ///
    /// [`send`]: Client::send
    pub fn send_with_deadline<F>(
        &self,
        deadline: Duration,
        encode: F,
    ) -> Result<CallHandle, ClientError>
    where
        F: FnOnce(CorrelationId) -> Vec<u8>,
    {
        let handle = self.send(encode)?;
        self.deadlines
            .lock()
            .unwrap()
            .push((Instant::now() + deadline, handle.id));
        Ok(handle)
    }

    /// Convenience wrapper sending `payload` in a correlated [`Envelope`].
    pub fn send_request(&self, payload: Payload) -> Result<CallHandle, ClientError> {
        self.send(|cid| Envelope::request(cid, payload).encode())
    }

    /// Registers a handler for one push-event kind. Handlers for the same
    /// kind run in registration order.
    pub fn subscribe<F>(&self, kind: PushEventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(kind, handler)
    }

    /// Removes a push or lifecycle subscription.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscriptions.unsubscribe(handle)
    }

    /// Registers a handler notified when the connection is established.
    pub fn on_connected<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscriptions.on_connected(handler)
    }

    /// Registers a handler notified on the terminal disconnect of each
    /// connection.
    pub fn on_disconnected<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&DisconnectInfo) + Send + Sync + 'static,
    {
        self.subscriptions.on_disconnected(handler)
    }

    /// Registers a handler notified of transport-level errors, including
    /// those observed while no call was in flight.
    pub fn on_transport_error<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscriptions.on_transport_error(handler)
    }

    /// The pump. Call once per frame or loop iteration from the consumer
    /// thread: pumps the transport, drains the bridge, routes the batch
    /// (lifecycle first, then data), then sweeps expired deadlines.
    /// Returns the number of events processed.
    ///
    /// Skipping ticks loses nothing — events and pending calls accumulate
    /// until the next call.
    pub fn tick(&self) -> usize {
        self.transport.tick();
        let mut count = 0;
        if !self.bridge.is_empty() {
            let batch: Vec<InboundEvent> = self.bridge.drain().collect();
            count = batch.len();
            self.router.route_batch(batch);
        }
        self.sweep_deadlines();
        count
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.ledger.len()
    }

    /// Server time in Unix milliseconds, tracked from heartbeats. Until the
    /// first heartbeat arrives this falls back to local time.
    pub fn server_time_ms(&self) -> i64 {
        let watermark = self.router.server_time_ms();
        if watermark > 0 {
            watermark
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64
        }
    }

    fn sweep_deadlines(&self) {
        let now = Instant::now();
        let expired: Vec<CorrelationId> = {
            let mut deadlines = self.deadlines.lock().unwrap();
            if deadlines.is_empty() {
                return;
            }
            let (due, rest): (Vec<_>, Vec<_>) =
                deadlines.drain(..).partition(|(at, _)| *at <= now);
            *deadlines = rest;
            due.into_iter().map(|(_, id)| id).collect()
        };
        for id in expired {
            // No-op if the call already resolved: first one wins.
            if self.ledger.fail(&id, ClientError::TimedOut) {
                warn!("⏰ Call {id} timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PresenceUpdate;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type SentLog = Arc<Mutex<Vec<(Vec<u8>, Option<CorrelationId>)>>>;

    /// Transport double: records sends, mirrors the real transports'
    /// lifecycle event contract.
    struct MockTransport {
        bridge: Arc<EventBridge>,
        closed: AtomicBool,
        connectionless: bool,
        sent: SentLog,
    }

    impl MockTransport {
        fn new(bridge: Arc<EventBridge>, connectionless: bool) -> (Self, SentLog) {
            let sent: SentLog = Arc::new(Mutex::new(Vec::new()));
            let transport = Self {
                bridge,
                closed: AtomicBool::new(false),
                connectionless,
                sent: sent.clone(),
            };
            (transport, sent)
        }
    }

    impl Transport for MockTransport {
        fn connect(&self) {
            self.bridge.enqueue(InboundEvent::Connected);
        }

        fn send(&self, bytes: Vec<u8>, correlation_id: Option<CorrelationId>) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push((bytes, correlation_id));
            Ok(())
        }

        fn close(&self) {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.bridge.enqueue(InboundEvent::Disconnected(DisconnectInfo::clean(
                    "client disconnect",
                )));
            }
        }

        fn is_connectionless(&self) -> bool {
            self.connectionless
        }
    }

    fn socket_client() -> Client {
        let bridge = Arc::new(EventBridge::new());
        let (transport, _) = MockTransport::new(bridge.clone(), false);
        Client::assemble(ClientConfig::default(), bridge, Box::new(transport))
    }

    fn connected_client() -> Client {
        let client = socket_client();
        client.connect();
        client.tick();
        assert_eq!(client.state(), ConnectionState::Connected);
        client
    }

    fn enqueue_response(client: &Client, cid: CorrelationId, value: serde_json::Value) {
        client.bridge.enqueue(InboundEvent::Data {
            bytes: Envelope::request(cid, Payload::Result(value)).encode(),
            correlation_id: None,
        });
    }

    #[test]
    fn state_machine_walks_the_full_cycle() {
        let client = socket_client();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.connect();
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.tick();
        assert_eq!(client.state(), ConnectionState::Connected);

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Closing);

        client.tick();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_requires_a_connection_on_the_socket_transport() {
        let client = socket_client();
        let result = client.send(|cid| Envelope::request(cid, Payload::Result(json!(1))).encode());
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn connectionless_transport_sends_in_any_state() {
        let bridge = Arc::new(EventBridge::new());
        let (transport, _) = MockTransport::new(bridge.clone(), true);
        let client = Client::assemble(ClientConfig::default(), bridge, Box::new(transport));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let handle = client.send_request(Payload::Result(json!({"op": 1}))).unwrap();
        assert_eq!(client.pending_calls(), 1);
        enqueue_response(&client, handle.correlation_id(), json!("ok"));
        client.tick();
        let mut handle = handle;
        assert_eq!(handle.try_result(), Some(Ok(json!("ok"))));
    }

    #[test]
    fn call_resolves_on_the_tick_that_observes_the_response() {
        let client = connected_client();
        let mut handle = client
            .send(|cid| Envelope::request(cid, Payload::Result(json!({"op": "status"}))).encode())
            .unwrap();
        assert_eq!(client.pending_calls(), 1);
        assert_eq!(handle.try_result(), None);

        enqueue_response(&client, handle.correlation_id(), json!({"healthy": true}));
        client.tick();

        assert_eq!(handle.try_result(), Some(Ok(json!({"healthy": true}))));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn disconnect_fails_every_outstanding_call_exactly_once() {
        let client = connected_client();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        client.on_disconnected(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut a = client.send_request(Payload::Result(json!(1))).unwrap();
        let mut b = client.send_request(Payload::Result(json!(2))).unwrap();
        assert_eq!(client.pending_calls(), 2);

        client.disconnect();
        client.disconnect(); // idempotent
        client.tick();

        for handle in [&mut a, &mut b] {
            assert_eq!(
                handle.try_result(),
                Some(Err(ClientError::ConnectionClosed(
                    "client disconnect".to_string()
                )))
            );
        }
        assert_eq!(client.pending_calls(), 0);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn expired_deadline_times_the_call_out() {
        let client = connected_client();
        let mut handle = client
            .send_with_deadline(Duration::ZERO, |cid| {
                Envelope::request(cid, Payload::Result(json!(1))).encode()
            })
            .unwrap();

        client.tick();
        assert_eq!(handle.try_result(), Some(Err(ClientError::TimedOut)));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn response_in_the_same_tick_beats_the_deadline() {
        let client = connected_client();
        let mut handle = client
            .send_with_deadline(Duration::ZERO, |cid| {
                Envelope::request(cid, Payload::Result(json!(1))).encode()
            })
            .unwrap();

        // Both the response and the expired deadline are observed by the
        // same tick; resolution is first-wins.
        enqueue_response(&client, handle.correlation_id(), json!("made it"));
        client.tick();

        assert_eq!(handle.try_result(), Some(Ok(json!("made it"))));
    }

    #[test]
    fn push_subscribers_fire_while_connected_and_clear_on_disconnect() {
        let client = connected_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        client.subscribe(PushEventKind::Presence, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let push = Envelope {
            cid: None,
            msg: Some(Payload::Presence(PresenceUpdate::default())),
        };
        client.bridge.enqueue(InboundEvent::Data {
            bytes: push.encode(),
            correlation_id: None,
        });
        client.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.disconnect();
        client.tick();

        client.bridge.enqueue(InboundEvent::Data {
            bytes: Envelope {
                cid: None,
                msg: Some(Payload::Presence(PresenceUpdate::default())),
            }
            .encode(),
            correlation_id: None,
        });
        client.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sent_bytes_carry_the_embedded_correlation_id() {
        let bridge = Arc::new(EventBridge::new());
        let (transport, sent) = MockTransport::new(bridge.clone(), false);
        let client = Client::assemble(ClientConfig::default(), bridge, Box::new(transport));
        client.connect();
        client.tick();

        let handle = client.send_request(Payload::Result(json!({"op": 7}))).unwrap();

        let recorded = sent.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let (bytes, tagged) = &recorded[0];
        assert_eq!(*tagged, Some(handle.correlation_id()));
        let envelope = Envelope::decode(bytes).unwrap();
        assert_eq!(envelope.cid, Some(handle.correlation_id()));
    }

    #[test]
    fn real_transports_construct_from_config() {
        let ws = Client::new(ClientConfig::default());
        assert!(ws.is_ok());
        let http = Client::new(ClientConfig {
            transport: crate::config::TransportKind::Http,
            ..Default::default()
        });
        assert!(http.is_ok());
    }
}
