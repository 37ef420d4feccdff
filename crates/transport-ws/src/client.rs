use std::{collections::HashSet, future, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt, stream::SplitSink},
    rally_config::TransportConfig,
    rally_protocol::{
        ClientMessage, MAX_PAYLOAD_BYTES, SUBPROTOCOL, ServerMessage, SubscribePayload, close_codes,
    },
    rally_realtime::{
        Error as RealtimeError, SubscriptionObserver, Transport, TransportFactory, Unsubscribe,
    },
    tokio::{
        net::TcpStream,
        sync::mpsc,
        time::{Instant, Interval, interval_at},
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{
            Message,
            client::IntoClientRequest,
            http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
        },
    },
    tracing::{debug, info, trace, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use rally_metrics::{counter, websocket as ws_metrics};

use crate::{
    error::{Error, Result},
    router::OperationRouter,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// First delay before re-opening a dropped socket.
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Validated connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    endpoint: Url,
    config: TransportConfig,
}

impl ConnectSettings {
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::Connection(format!(
                "unsupported endpoint scheme `{}`",
                endpoint.scheme()
            )));
        }
        Ok(Self {
            endpoint,
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn init_frame(&self) -> ClientMessage {
        ClientMessage::init(self.config.token())
    }
}

/// How one socket session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Every [`WsTransport`] handle was dropped.
    ClientClosed,
    /// The server closed the socket, with its close code if it sent one.
    ServerClosed(Option<u16>),
}

/// A multiplexed `graphql-transport-ws` connection.
///
/// Each `subscribe` becomes one operation id on the shared socket. When the
/// socket drops, every open operation is failed (the caller decides whether
/// to resubscribe) and the socket is re-opened in the background with
/// capped exponential backoff. Frames written while the socket is down are
/// sent once it is back.
pub struct WsTransport {
    write_tx: mpsc::UnboundedSender<ClientMessage>,
    router: Arc<OperationRouter>,
}

impl WsTransport {
    /// Open the socket and complete the `connection_init` handshake.
    pub async fn connect(settings: ConnectSettings) -> Result<Self> {
        let socket = open_socket(&settings).await?;
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let router = Arc::new(OperationRouter::new());
        tokio::spawn(connection_loop(
            settings,
            socket,
            Arc::clone(&router),
            write_rx,
        ));
        Ok(Self { write_tx, router })
    }

    /// Operations currently open on the socket.
    #[must_use]
    pub fn open_operations(&self) -> usize {
        self.router.len()
    }
}

impl Transport for WsTransport {
    fn subscribe(
        &self,
        payload: SubscribePayload,
        observer: Arc<dyn SubscriptionObserver>,
    ) -> Unsubscribe {
        let id = uuid::Uuid::new_v4().to_string();
        self.router.insert(id.clone(), Arc::clone(&observer));

        let frame = ClientMessage::Subscribe {
            id: id.clone(),
            payload,
        };
        if self.write_tx.send(frame).is_err() {
            self.router.remove(&id);
            observer.error(RealtimeError::transport("websocket connection closed"));
            return Unsubscribe::noop();
        }
        debug!(id = %id, "subscribe sent");

        let router = Arc::clone(&self.router);
        let write_tx = self.write_tx.downgrade();
        Unsubscribe::new(move || {
            // Server already ended the operation.
            if router.remove(&id).is_none() {
                return Ok(());
            }
            let Some(write_tx) = write_tx.upgrade() else {
                return Ok(());
            };
            write_tx
                .send(ClientMessage::Complete { id })
                .map_err(|_| RealtimeError::transport("websocket connection closed"))
        })
    }
}

/// Creates a [`WsTransport`] from transport config on first use.
pub struct WsTransportFactory {
    settings: ConnectSettings,
}

impl WsTransportFactory {
    pub fn new(settings: ConnectSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        ConnectSettings::from_config(config).map(Self::new)
    }
}

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn connect(&self) -> rally_realtime::Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> =
            Arc::new(WsTransport::connect(self.settings.clone()).await?);
        Ok(transport)
    }
}

fn text(message: &ClientMessage) -> Result<Message> {
    Ok(Message::Text(message.to_text()?.into()))
}

/// Connect, send `connection_init`, and wait for `connection_ack`.
async fn open_socket(settings: &ConnectSettings) -> Result<WsStream> {
    let mut request = settings.endpoint.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

    let timeout = settings.config.ack_timeout();
    let (mut socket, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| Error::Connection("connect timed out".into()))??;

    socket.send(text(&settings.init_frame())?).await?;
    wait_for_ack(&mut socket, timeout).await?;

    #[cfg(feature = "metrics")]
    counter!(ws_metrics::CONNECTIONS_TOTAL).increment(1);
    info!(endpoint = %settings.endpoint, "websocket connected");
    Ok(socket)
}

async fn wait_for_ack(socket: &mut WsStream, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, read_until_ack(socket))
        .await
        .map_err(|_| Error::Connection("connection_ack timed out".into()))?
}

async fn read_until_ack(socket: &mut WsStream) -> Result<()> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(body) => match ServerMessage::parse(&body) {
                Ok(ServerMessage::ConnectionAck { .. }) => return Ok(()),
                Ok(ServerMessage::Ping { .. }) => {
                    socket.send(text(&ClientMessage::Pong { payload: None })?).await?;
                },
                Ok(other) => trace!(frame = ?other, "ignoring frame before ack"),
                Err(e) => return Err(Error::Protocol(format!("invalid frame before ack: {e}"))),
            },
            Message::Close(frame) => {
                return match frame.map(|f| u16::from(f.code)) {
                    Some(code) if close_codes::is_terminal(code) => Err(Error::Auth { code }),
                    _ => Err(Error::Connection(
                        "server closed connection during handshake".into(),
                    )),
                };
            },
            _ => {},
        }
    }
    Err(Error::Connection("connection closed before ack".into()))
}

/// Keep the socket alive until every transport handle is dropped.
async fn connection_loop(
    settings: ConnectSettings,
    mut socket: WsStream,
    router: Arc<OperationRouter>,
    mut write_rx: mpsc::UnboundedReceiver<ClientMessage>,
) {
    let mut pending = Vec::new();
    let max_delay = settings.config.reconnect_max().max(INITIAL_RECONNECT_DELAY);

    loop {
        let mut delay = INITIAL_RECONNECT_DELAY;
        let outcome = run_session(&settings, socket, &router, &mut write_rx, &mut pending).await;
        let reason = match outcome {
            Ok(SessionEnd::ClientClosed) => {
                debug!("transport dropped, websocket closed");
                router.fail_all("transport closed");
                return;
            },
            Ok(SessionEnd::ServerClosed(Some(code))) if close_codes::is_terminal(code) => {
                delay = max_delay;
                format!("server closed connection with code {code}")
            },
            Ok(SessionEnd::ServerClosed(code)) => match code {
                Some(code) => format!("server closed connection with code {code}"),
                None => "server closed connection".to_owned(),
            },
            Err(e) => e.to_string(),
        };
        let failed = router.fail_all(&reason);
        warn!(reason = %reason, failed, "websocket connection lost");

        socket = loop {
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            info!(delay_ms, "reconnecting websocket after delay");
            if !wait_buffering(delay, &mut write_rx, &mut pending).await {
                debug!("transport dropped while reconnecting");
                return;
            }
            #[cfg(feature = "metrics")]
            counter!(ws_metrics::RECONNECTS_TOTAL).increment(1);
            match open_socket(&settings).await {
                Ok(socket) => break socket,
                Err(e) => {
                    warn!(error = %e, "websocket reconnect failed");
                    delay = (delay * 2).min(max_delay);
                },
            }
        };
    }
}

/// Sleep for `delay`, queueing writes that arrive meanwhile. Returns `false`
/// if the write channel closed.
async fn wait_buffering(
    delay: Duration,
    write_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    pending: &mut Vec<ClientMessage>,
) -> bool {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return true,
            message = write_rx.recv() => match message {
                Some(message) => pending.push(message),
                None => return false,
            },
        }
    }
}

/// Whether a queued frame still belongs to an open operation. Subscribes
/// whose operation was failed or unsubscribed must not reach the server.
fn still_wanted(message: &ClientMessage, router: &OperationRouter) -> bool {
    match message {
        ClientMessage::Subscribe { id, .. } => router.contains(id),
        _ => true,
    }
}

/// Drop buffered frames for operations that ended while the socket was down,
/// along with the `complete` frames that would close them.
fn retain_live(pending: &mut Vec<ClientMessage>, router: &OperationRouter) {
    let mut dropped = HashSet::new();
    pending.retain(|message| match message {
        ClientMessage::Subscribe { id, .. } if !router.contains(id) => {
            dropped.insert(id.clone());
            false
        },
        ClientMessage::Complete { id } => !dropped.contains(id),
        _ => true,
    });
    if !dropped.is_empty() {
        debug!(dropped = dropped.len(), "discarded subscribes for ended operations");
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        },
        None => future::pending().await,
    }
}

/// Forward frames in both directions until the socket or the write channel
/// closes.
async fn run_session(
    settings: &ConnectSettings,
    socket: WsStream,
    router: &OperationRouter,
    write_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    pending: &mut Vec<ClientMessage>,
) -> Result<SessionEnd> {
    let (mut sink, mut stream) = socket.split();
    retain_live(pending, router);
    for message in pending.drain(..) {
        sink.send(text(&message)?).await?;
    }

    let period = settings.config.keepalive();
    let mut keepalive = (!period.is_zero()).then(|| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(body))) => handle_text(&body, router, &mut sink).await?,
                Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(frame))) => {
                    return Ok(SessionEnd::ServerClosed(frame.map(|f| u16::from(f.code))));
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(Error::WebSocket(e)),
                None => return Ok(SessionEnd::ServerClosed(None)),
            },
            message = write_rx.recv() => match message {
                Some(message) if still_wanted(&message, router) => {
                    sink.send(text(&message)?).await?;
                },
                Some(_) => trace!("dropping subscribe for ended operation"),
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::ClientClosed);
                },
            },
            () = tick(&mut keepalive) => {
                sink.send(text(&ClientMessage::Ping { payload: None })?).await?;
            },
        }
    }
}

async fn handle_text(body: &str, router: &OperationRouter, sink: &mut WsSink) -> Result<()> {
    #[cfg(feature = "metrics")]
    counter!(ws_metrics::FRAMES_RECEIVED_TOTAL).increment(1);

    if body.len() > MAX_PAYLOAD_BYTES {
        warn!(bytes = body.len(), "dropping oversized frame");
        return Ok(());
    }
    let message = match ServerMessage::parse(body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "dropping unparseable frame");
            return Ok(());
        },
    };
    match message {
        ServerMessage::Ping { .. } => {
            sink.send(text(&ClientMessage::Pong { payload: None })?).await?;
        },
        ServerMessage::Pong { .. } => trace!("keepalive pong"),
        ServerMessage::ConnectionAck { .. } => debug!("duplicate connection_ack ignored"),
        operation => {
            let id = operation.operation_id().map(str::to_owned);
            if !router.route(operation) {
                trace!(id = ?id, "frame for closed operation dropped");
            }
        },
    }
    Ok(())
}
