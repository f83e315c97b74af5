//! End-to-end round trips against in-process servers.
//!
//! The WebSocket tests run the real persistent-socket transport against a
//! local echo server; the HTTP test runs the one-shot transport against a
//! minimal HTTP/1.1 responder.

use beacon_client::{
    Client, ClientConfig, ClientError, ConnectionState, Envelope, Payload, PresenceUpdate,
    PushEventKind, TransportKind,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Ticks the client until `predicate` holds, failing the test if it never
/// does.
async fn tick_until(client: &Client, mut predicate: impl FnMut() -> bool) {
    for _ in 0..500 {
        client.tick();
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached after 5 seconds of ticking");
}

/// Echo server: answers every correlated request with a result payload and
/// follows it with one presence push.
async fn spawn_ws_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = match accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(message)) = source.next().await {
                    match message {
                        Message::Binary(payload) => {
                            let envelope = Envelope::decode(&payload).unwrap();
                            let reply = Envelope {
                                cid: envelope.cid,
                                msg: Some(Payload::Result(json!({"echo": true}))),
                            };
                            if sink
                                .send(Message::Binary(reply.encode().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                            let push = Envelope {
                                cid: None,
                                msg: Some(Payload::Presence(PresenceUpdate {
                                    source_id: "match-1".to_string(),
                                    ..Default::default()
                                })),
                            };
                            let _ = sink.send(Message::Binary(push.encode().into())).await;
                        }
                        Message::Close(frame) => {
                            let _ = sink.send(Message::Close(frame)).await;
                            break;
                        }
                        _ => {}
                    }
                }
            });
        }
    });
    port
}

#[tokio::test(flavor = "multi_thread")]
async fn websocket_call_and_push_round_trip() {
    let port = spawn_ws_server().await;
    let client = Client::new(ClientConfig {
        port,
        socket_path: "/".to_string(),
        ..Default::default()
    })
    .unwrap();

    let connects = Arc::new(AtomicUsize::new(0));
    let counter = connects.clone();
    client.on_connected(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let pushes = Arc::new(AtomicUsize::new(0));
    let counter = pushes.clone();
    client.subscribe(PushEventKind::Presence, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.connect();
    tick_until(&client, || client.state() == ConnectionState::Connected).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    let handle = client
        .send_request(Payload::Result(json!({"op": "status"})))
        .unwrap();
    let mut handle = handle;
    let mut outcome = None;
    tick_until(&client, || {
        outcome = outcome.take().or_else(|| handle.try_result());
        outcome.is_some()
    })
    .await;
    assert_eq!(outcome.unwrap(), Ok(json!({"echo": true})));
    assert_eq!(client.pending_calls(), 0);

    tick_until(&client, || pushes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn websocket_push_handlers_fire_in_registration_order() {
    let port = spawn_ws_server().await;
    let client = Client::new(ClientConfig {
        port,
        socket_path: "/".to_string(),
        ..Default::default()
    })
    .unwrap();

    let order: Arc<Mutex<Vec<&str>>> = Arc::new(Mutex::new(Vec::new()));
    for tag in ["h1", "h2"] {
        let order = order.clone();
        client.subscribe(PushEventKind::Presence, move |_| {
            order.lock().unwrap().push(tag);
        });
    }

    client.connect();
    tick_until(&client, || client.state() == ConnectionState::Connected).await;

    // Two requests produce two pushes; both handlers fire per push.
    for _ in 0..2 {
        client.send_request(Payload::Result(json!(1))).unwrap();
    }
    tick_until(&client, || order.lock().unwrap().len() == 4).await;
    assert_eq!(*order.lock().unwrap(), vec!["h1", "h2", "h1", "h2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn websocket_disconnect_is_clean_and_notified_once() {
    let port = spawn_ws_server().await;
    let client = Client::new(ClientConfig {
        port,
        socket_path: "/".to_string(),
        ..Default::default()
    })
    .unwrap();

    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    client.on_disconnected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.connect();
    tick_until(&client, || client.state() == ConnectionState::Connected).await;

    client.disconnect();
    client.disconnect();
    tick_until(&client, || client.state() == ConnectionState::Disconnected).await;

    // Give a straggling duplicate every chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.tick();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);

    match client.send_request(Payload::Result(json!(1))) {
        Err(ClientError::NotConnected) => {}
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Minimal HTTP/1.1 responder answering every POST with a correlated
/// result payload.
async fn spawn_http_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 1024];
                let body_start = loop {
                    let n = match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let headers = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
                let content_length: usize = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse().ok())
                    .unwrap_or(0);
                while buf.len() < body_start + content_length {
                    let n = match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&tmp[..n]);
                }

                let envelope = Envelope::decode(&buf[body_start..body_start + content_length])
                    .expect("request body is an envelope");
                let reply = Envelope {
                    cid: envelope.cid,
                    msg: Some(Payload::Result(json!({"via": "http"}))),
                }
                .encode();
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    reply.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&reply).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    port
}

#[tokio::test(flavor = "multi_thread")]
async fn http_call_round_trip() {
    let port = spawn_http_server().await;
    let client = Client::new(ClientConfig {
        port,
        transport: TransportKind::Http,
        ..Default::default()
    })
    .unwrap();

    // The one-shot transport is connectionless: no connect() required.
    let mut handle = client
        .send_request(Payload::Result(json!({"op": "login"})))
        .unwrap();
    assert_eq!(client.pending_calls(), 1);

    let mut outcome = None;
    tick_until(&client, || {
        outcome = outcome.take().or_else(|| handle.try_result());
        outcome.is_some()
    })
    .await;
    assert_eq!(outcome.unwrap(), Ok(json!({"via": "http"})));
    assert_eq!(client.pending_calls(), 0);
}
