//! WsTransport against an in-process graphql-transport-ws server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    rally_config::TransportConfig,
    rally_protocol::{SUBPROTOCOL, SubscribePayload},
    rally_realtime::{Error as RealtimeError, SubscriptionObserver, Transport},
    rally_transport_ws::{ConnectSettings, Error, WsTransport},
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::{
        net::{TcpListener, TcpStream},
        sync::mpsc,
        time::timeout,
    },
    tokio_tungstenite::{
        WebSocketStream, accept_hdr_async,
        tungstenite::{
            Message,
            handshake::server::{ErrorResponse, Request, Response},
            http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
            protocol::{CloseFrame, frame::coding::CloseCode},
        },
    },
};

// ── Mock server ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Mode {
    Ack,
    Silent,
    Reject(u16),
}

enum Command {
    Complete(String),
    Close,
}

struct MockServer {
    addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<Command>,
}

impl MockServer {
    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(listener, mode, frames_tx, command_rx));
        Self {
            addr,
            frames,
            commands,
        }
    }

    fn settings(&self, ack_timeout_ms: u64) -> ConnectSettings {
        ConnectSettings::from_config(&TransportConfig {
            endpoint: format!("ws://{}/graphql", self.addr),
            auth_token: Some(Secret::new("s3cret".to_owned())),
            ack_timeout_ms,
            ..TransportConfig::default()
        })
        .unwrap()
    }

    /// Next client frame of the given type, skipping keepalives and
    /// handshakes. The timeout covers the client's first reconnect delay.
    async fn expect_frame(&mut self, kind: &str) -> Value {
        loop {
            let frame = timeout(Duration::from_secs(5), self.frames.recv())
                .await
                .expect("frame timeout")
                .expect("server gone");
            if frame["type"] == kind {
                return frame;
            }
            assert!(
                frame["type"] == "ping" || frame["type"] == "connection_init",
                "unexpected frame {frame}"
            );
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Accept connections one after another until the test drops its command
/// sender.
async fn serve(
    listener: TcpListener,
    mode: Mode,
    frames: mpsc::UnboundedSender<Value>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_hdr_async(stream, |_req: &Request, mut resp: Response| {
            resp.headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();
        if !serve_connection(ws, mode, &frames, &mut commands).await {
            return;
        }
    }
}

/// Returns whether to accept another connection.
async fn serve_connection(
    mut ws: WebSocketStream<TcpStream>,
    mode: Mode,
    frames: &mpsc::UnboundedSender<Value>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(Ok(Message::Text(body))) = frame else {
                    return true;
                };
                let value: Value = serde_json::from_str(&body).unwrap();
                let _ = frames.send(value.clone());
                match value["type"].as_str() {
                    Some("connection_init") => match mode {
                        Mode::Ack => send(&mut ws, json!({"type": "connection_ack"})).await,
                        Mode::Silent => {},
                        Mode::Reject(code) => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: "forbidden".into(),
                                }))
                                .await;
                            return true;
                        },
                    },
                    Some("subscribe") => {
                        let echo = json!({
                            "type": "next",
                            "id": value["id"],
                            "payload": {"data": {"echo": value["payload"]["variables"]}}
                        });
                        send(&mut ws, echo).await;
                    },
                    Some("ping") => send(&mut ws, json!({"type": "pong"})).await,
                    _ => {},
                }
            },
            command = commands.recv() => match command {
                Some(Command::Complete(id)) => {
                    send(&mut ws, json!({"type": "complete", "id": id})).await;
                },
                Some(Command::Close) => {
                    let _ = ws.close(None).await;
                    return true;
                },
                None => {
                    let _ = ws.close(None).await;
                    return false;
                },
            },
        }
    }
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Seen {
    Next(Value),
    Error(String),
    Complete,
}

struct ChannelObserver(mpsc::UnboundedSender<Seen>);

impl SubscriptionObserver for ChannelObserver {
    fn next(&self, result: rally_protocol::ExecutionResult) {
        let _ = self.0.send(Seen::Next(result.data.unwrap_or_default()));
    }

    fn error(&self, error: RealtimeError) {
        let _ = self.0.send(Seen::Error(error.to_string()));
    }

    fn complete(&self) {
        let _ = self.0.send(Seen::Complete);
    }
}

fn observer() -> (Arc<ChannelObserver>, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelObserver(tx)), rx)
}

async fn seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("observer timeout")
        .expect("observer dropped")
}

fn payload(channel_id: &str) -> SubscribePayload {
    SubscribePayload::new(
        "subscription ($channelId: ID!) { channelTyping(channelId: $channelId) { isTyping } }",
        json!({"channelId": channel_id}),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_then_unsubscribe_round_trip() {
    let mut server = MockServer::start(Mode::Ack).await;
    let transport = WsTransport::connect(server.settings(2_000)).await.unwrap();

    let init = server.expect_frame("connection_init").await;
    assert_eq!(init["payload"]["authorization"], "Bearer s3cret");

    let (obs, mut rx) = observer();
    let unsubscribe = transport.subscribe(payload("c-1"), obs);
    let subscribe = server.expect_frame("subscribe").await;
    assert_eq!(subscribe["payload"]["variables"]["channelId"], "c-1");

    assert_eq!(
        seen(&mut rx).await,
        Seen::Next(json!({"echo": {"channelId": "c-1"}}))
    );
    assert_eq!(transport.open_operations(), 1);

    unsubscribe.call().unwrap();
    let complete = server.expect_frame("complete").await;
    assert_eq!(complete["id"], subscribe["id"]);
    assert_eq!(transport.open_operations(), 0);
}

#[tokio::test]
async fn server_complete_reaches_observer() {
    let mut server = MockServer::start(Mode::Ack).await;
    let transport = WsTransport::connect(server.settings(2_000)).await.unwrap();

    let (obs, mut rx) = observer();
    let unsubscribe = transport.subscribe(payload("c-2"), obs);
    let subscribe = server.expect_frame("subscribe").await;
    assert!(matches!(seen(&mut rx).await, Seen::Next(_)));

    let id = subscribe["id"].as_str().unwrap().to_owned();
    server.commands.send(Command::Complete(id)).unwrap();
    assert_eq!(seen(&mut rx).await, Seen::Complete);

    // Nothing left to complete on the wire.
    unsubscribe.call().unwrap();
    assert_eq!(transport.open_operations(), 0);
}

#[tokio::test]
async fn socket_loss_fails_open_operations() {
    let mut server = MockServer::start(Mode::Ack).await;
    let transport = WsTransport::connect(server.settings(2_000)).await.unwrap();

    let (obs, mut rx) = observer();
    let _unsubscribe = transport.subscribe(payload("c-3"), obs);
    server.expect_frame("subscribe").await;
    assert!(matches!(seen(&mut rx).await, Seen::Next(_)));

    server.commands.send(Command::Close).unwrap();
    match seen(&mut rx).await {
        Seen::Error(message) => assert!(message.contains("closed"), "{message}"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(transport.open_operations(), 0);
}

#[tokio::test]
async fn missing_ack_times_out() {
    let server = MockServer::start(Mode::Silent).await;
    let err = WsTransport::connect(server.settings(200))
        .await
        .err()
        .expect("connect should fail");
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[tokio::test]
async fn forbidden_close_is_reported_as_auth_failure() {
    let server = MockServer::start(Mode::Reject(4403)).await;
    let err = WsTransport::connect(server.settings(2_000))
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, Error::Auth { code: 4403 }), "{err}");
}

#[tokio::test]
async fn subscribe_while_down_is_sent_after_reconnect() {
    let mut server = MockServer::start(Mode::Ack).await;
    let transport = WsTransport::connect(server.settings(2_000)).await.unwrap();
    server.expect_frame("connection_init").await;

    let (first, mut first_rx) = observer();
    let _first = transport.subscribe(payload("c-1"), first);
    server.expect_frame("subscribe").await;
    assert!(matches!(seen(&mut first_rx).await, Seen::Next(_)));

    server.commands.send(Command::Close).unwrap();
    assert!(matches!(seen(&mut first_rx).await, Seen::Error(_)));

    // The socket is down until the first reconnect delay elapses.
    let (second, mut second_rx) = observer();
    let _second = transport.subscribe(payload("c-2"), second);
    assert_eq!(transport.open_operations(), 1);

    server.expect_frame("connection_init").await;
    let replayed = server.expect_frame("subscribe").await;
    assert_eq!(replayed["payload"]["variables"]["channelId"], "c-2");
    assert_eq!(
        seen(&mut second_rx).await,
        Seen::Next(json!({"echo": {"channelId": "c-2"}}))
    );
}

#[tokio::test]
async fn operation_ended_while_down_never_reaches_new_socket() {
    let mut server = MockServer::start(Mode::Ack).await;
    let transport = WsTransport::connect(server.settings(2_000)).await.unwrap();
    server.expect_frame("connection_init").await;

    let (first, mut first_rx) = observer();
    let _first = transport.subscribe(payload("c-1"), first);
    server.expect_frame("subscribe").await;
    assert!(matches!(seen(&mut first_rx).await, Seen::Next(_)));

    server.commands.send(Command::Close).unwrap();
    assert!(matches!(seen(&mut first_rx).await, Seen::Error(_)));

    let (gone, _gone_rx) = observer();
    transport.subscribe(payload("c-gone"), gone).call().unwrap();
    let (live, mut live_rx) = observer();
    let _live = transport.subscribe(payload("c-live"), live);

    server.expect_frame("connection_init").await;
    // Neither the abandoned subscribe nor its complete is replayed.
    let replayed = server.expect_frame("subscribe").await;
    assert_eq!(replayed["payload"]["variables"]["channelId"], "c-live");
    assert!(matches!(seen(&mut live_rx).await, Seen::Next(_)));
    assert_eq!(transport.open_operations(), 1);
}
