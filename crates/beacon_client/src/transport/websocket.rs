//! Persistent-socket transport over WebSocket.
//!
//! `connect` spawns an I/O task owning both halves of the socket. Outbound
//! frames queue on an unbounded channel serviced by the writer half, so
//! `send` never blocks and frames queued before the handshake completes are
//! flushed as soon as the connection is established. Everything the socket
//! observes is reported through the event bridge.

use crate::bridge::EventBridge;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{DisconnectInfo, InboundEvent};
use crate::ledger::CorrelationId;
use crate::transport::Transport;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

enum OutboundFrame {
    Data(Vec<u8>),
    Close,
}

/// Handle for one socket connection: the outbound queue feeding the writer
/// task, and the close-requested flag shared with the I/O task.
struct SocketHandle {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

/// WebSocket-backed [`Transport`].
pub struct WebSocketTransport {
    config: ClientConfig,
    bridge: Arc<EventBridge>,
    socket: Mutex<Option<SocketHandle>>,
}

impl WebSocketTransport {
    pub fn new(config: ClientConfig, bridge: Arc<EventBridge>) -> Self {
        Self {
            config,
            bridge,
            socket: Mutex::new(None),
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        let mut socket = self.socket.lock().unwrap();
        if let Some(handle) = socket.as_ref() {
            if !handle.closed.load(Ordering::SeqCst) {
                warn!("⚠️ Connect ignored: socket already active");
                return;
            }
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        *socket = Some(SocketHandle {
            outbound,
            closed: closed.clone(),
        });

        let url = self
            .config
            .socket_url(self.config.session_token.as_deref());
        info!("🔌 Connecting socket: {url}");
        tokio::spawn(run_socket(
            url,
            self.config.connect_timeout(),
            outbound_rx,
            self.bridge.clone(),
            closed,
        ));
    }

    fn send(&self, bytes: Vec<u8>, _correlation_id: Option<CorrelationId>) -> Result<(), ClientError> {
        let socket = self.socket.lock().unwrap();
        match socket.as_ref() {
            Some(handle) if !handle.closed.load(Ordering::SeqCst) => handle
                .outbound
                .send(OutboundFrame::Data(bytes))
                .map_err(|_| ClientError::NotConnected),
            _ => Err(ClientError::NotConnected),
        }
    }

    fn close(&self) {
        let socket = self.socket.lock().unwrap();
        if let Some(handle) = socket.as_ref() {
            if !handle.closed.swap(true, Ordering::SeqCst) {
                info!("🔌 Closing socket");
                let _ = handle.outbound.send(OutboundFrame::Close);
            } else {
                debug!("Close ignored: socket already closing");
            }
        }
    }
}

/// I/O task for one connection. Enqueues exactly one `Disconnected` event
/// on the way out, whatever path led there.
async fn run_socket(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    bridge: Arc<EventBridge>,
    closed: Arc<AtomicBool>,
) {
    let stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            error!("❌ Socket connect failed: {e}");
            bridge.enqueue(InboundEvent::Error {
                message: e.to_string(),
                correlation_id: None,
            });
            closed.store(true, Ordering::SeqCst);
            bridge.enqueue(InboundEvent::Disconnected(DisconnectInfo::abnormal(
                e.to_string(),
            )));
            return;
        }
        Err(_) => {
            let message = format!("connect to {url} timed out");
            error!("❌ {message}");
            bridge.enqueue(InboundEvent::Error {
                message: message.clone(),
                correlation_id: None,
            });
            closed.store(true, Ordering::SeqCst);
            bridge.enqueue(InboundEvent::Disconnected(DisconnectInfo::abnormal(message)));
            return;
        }
    };

    if !closed.load(Ordering::SeqCst) {
        bridge.enqueue(InboundEvent::Connected);
    }
    debug!("Socket established");

    let (mut sink, mut source) = stream.split();
    let mut close_requested = closed.load(Ordering::SeqCst);
    if close_requested {
        // close() won the race against the handshake.
        let _ = sink.send(Message::Close(None)).await;
    }
    let mut teardown = DisconnectInfo::abnormal("stream ended");

    loop {
        tokio::select! {
            frame = outbound.recv(), if !close_requested => match frame {
                Some(OutboundFrame::Data(bytes)) => {
                    if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                        error!("❌ Socket write failed: {e}");
                        bridge.enqueue(InboundEvent::Error {
                            message: e.to_string(),
                            correlation_id: None,
                        });
                        teardown = DisconnectInfo::abnormal(e.to_string());
                        break;
                    }
                }
                Some(OutboundFrame::Close) | None => {
                    // Stop writing and wait for the server's close reply or
                    // the end of the stream.
                    close_requested = true;
                    let _ = sink.send(Message::Close(None)).await;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Binary(payload))) => {
                    if !closed.load(Ordering::SeqCst) {
                        bridge.enqueue(InboundEvent::Data {
                            bytes: payload.to_vec(),
                            correlation_id: None,
                        });
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if !closed.load(Ordering::SeqCst) {
                        bridge.enqueue(InboundEvent::Data {
                            bytes: text.as_bytes().to_vec(),
                            correlation_id: None,
                        });
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    teardown = match frame {
                        Some(frame) => DisconnectInfo {
                            code: frame.code.into(),
                            reason: frame.reason.to_string(),
                            was_clean: true,
                        },
                        None => DisconnectInfo::clean(""),
                    };
                    break;
                }
                // Ping/pong are serviced by the library.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if !closed.load(Ordering::SeqCst) {
                        bridge.enqueue(InboundEvent::Error {
                            message: e.to_string(),
                            correlation_id: None,
                        });
                    }
                    teardown = DisconnectInfo::abnormal(e.to_string());
                    break;
                }
                None => {
                    if close_requested {
                        teardown = DisconnectInfo::clean("closed by client");
                    }
                    break;
                }
            },
        }
    }

    closed.store(true, Ordering::SeqCst);
    bridge.enqueue(InboundEvent::Disconnected(teardown));
}
