use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, client_async_tls_with_config, connect_async,
};
use tracing::{debug, info, trace};

use super::constants::{CONNECTION_TIMEOUT, OUTBOUND_QUEUE_SIZE};
use super::dispatcher::EventDispatcher;
use super::error::{GatewayError, GatewayResult};
use super::proxy::ProxyConfig;
use super::session::SessionShared;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

/// A text-frame transport to the gateway.
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Opens the transport, sending `user_agent` as the `User-Agent` header
    /// and tunneling through `proxy` when one is given.
    async fn connect(
        &mut self,
        url: &str,
        user_agent: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> GatewayResult<()>;
    /// Closes the transport. Idempotent.
    async fn disconnect(&mut self) -> GatewayResult<()>;
    /// Writes one text frame.
    async fn send(&mut self, text: &str) -> GatewayResult<()>;
    /// Next inbound text frame. A close from the peer surfaces as
    /// `GatewayError::ConnectionClosed`.
    async fn receive(&mut self) -> GatewayResult<String>;
    /// Whether the transport is open.
    fn is_connected(&self) -> bool;
}

/// WebSocket transport over `tokio-tungstenite` with rustls.
pub struct WebSocketConnection {
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
    connected: bool,
}

impl WebSocketConnection {
    /// A transport that is not connected yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            writer: None,
            reader: None,
            connected: false,
        }
    }
}

impl Default for WebSocketConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayConnection for WebSocketConnection {
    async fn connect(
        &mut self,
        url: &str,
        user_agent: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> GatewayResult<()> {
        let mut request = url
            .into_client_request()
            .map_err(|e| GatewayError::connection_failed(e.to_string()))?;

        if let Some(agent) = user_agent {
            let value = HeaderValue::from_str(agent)
                .map_err(|e| GatewayError::connection_failed(format!("invalid user agent: {e}")))?;
            request.headers_mut().insert(USER_AGENT, value);
        }

        let ws_stream = timeout(CONNECTION_TIMEOUT, open_stream(request, proxy))
            .await
            .map_err(|_| GatewayError::timeout("connection"))??;

        let (writer, reader) = ws_stream.split();
        self.writer = Some(writer);
        self.reader = Some(reader);
        self.connected = true;

        debug!(url = url, "WebSocket connection established");
        Ok(())
    }

    async fn disconnect(&mut self) -> GatewayResult<()> {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.reader = None;
        self.connected = false;
        debug!("WebSocket connection closed");
        Ok(())
    }

    async fn send(&mut self, text: &str) -> GatewayResult<()> {
        let writer = self.writer.as_mut().ok_or(GatewayError::NotConnected)?;

        writer
            .send(WsMessage::Text(text.to_owned().into()))
            .await
            .map_err(|e| GatewayError::websocket(e.to_string()))
    }

    async fn receive(&mut self) -> GatewayResult<String> {
        let reader = self.reader.as_mut().ok_or(GatewayError::NotConnected)?;

        loop {
            match reader.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(WsMessage::Binary(data))) => {
                    // Compression is never negotiated, so binary frames only
                    // ever carry plain JSON.
                    return String::from_utf8(data.to_vec())
                        .map_err(|e| GatewayError::protocol(format!("binary frame: {e}")));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    self.connected = false;
                    let (code, reason) = frame.map_or_else(
                        || (1000, "Normal closure".to_string()),
                        |f| (f.code.into(), f.reason.to_string()),
                    );

                    return Err(GatewayError::ConnectionClosed { code, reason });
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Some(writer) = self.writer.as_mut() {
                        let _ = writer.send(WsMessage::Pong(data)).await;
                    }
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(GatewayError::websocket(e.to_string()));
                }
                None => {
                    self.connected = false;
                    return Err(GatewayError::ConnectionClosed {
                        code: 1000,
                        reason: "Stream ended".to_string(),
                    });
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

async fn open_stream(request: Request, proxy: Option<&ProxyConfig>) -> GatewayResult<WsStream> {
    let Some(proxy) = proxy else {
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| GatewayError::connection_failed(e.to_string()))?;
        return Ok(ws_stream);
    };

    let uri = request.uri();
    let host = uri
        .host()
        .ok_or_else(|| GatewayError::connection_failed("gateway URL has no host"))?
        .to_string();
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let tunnel = proxy.open_tunnel(&host, port).await?;
    let (ws_stream, _) = client_async_tls_with_config(request, tunnel, None, None)
        .await
        .map_err(|e| GatewayError::connection_failed(e.to_string()))?;
    Ok(ws_stream)
}

/// Text queued for the connection task. When `ack` is set the task reports
/// the transport result back through it.
pub struct OutboundFrame {
    pub text: String,
    pub ack: Option<oneshot::Sender<GatewayResult<()>>>,
}

#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundFrame>,
}

impl OutboundSender {
    /// Queues a frame without waiting for the transport.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SendFailed` if the connection task is gone.
    pub async fn send(&self, text: String) -> GatewayResult<()> {
        self.tx
            .send(OutboundFrame { text, ack: None })
            .await
            .map_err(|_| GatewayError::send_failed("connection task stopped"))
    }

    /// Queues a frame and waits until the transport accepted or rejected it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::SendFailed` if the transport rejected the frame
    /// or the connection task stopped before writing it.
    pub async fn send_confirmed(&self, text: String) -> GatewayResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(OutboundFrame {
                text,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| GatewayError::send_failed("connection task stopped"))?;

        ack_rx
            .await
            .map_err(|_| GatewayError::send_failed("connection task stopped"))?
            .map_err(|e| GatewayError::send_failed(e.to_string()))
    }
}

#[must_use]
pub fn outbound_channel() -> (OutboundSender, mpsc::Receiver<OutboundFrame>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
    (OutboundSender { tx }, rx)
}

/// The connection task: sole owner of the transport.
///
/// Reads frames into the dispatcher, writes the dispatcher's replies and the
/// frames other tasks queue, and fails the session when no frame arrives
/// within the current receive deadline.
pub struct ConnectionDriver {
    connection: Box<dyn GatewayConnection>,
    dispatcher: EventDispatcher,
    shared: Arc<SessionShared>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    shutdown: Arc<Notify>,
    hello_timeout: Duration,
}

impl ConnectionDriver {
    pub fn new(
        connection: Box<dyn GatewayConnection>,
        dispatcher: EventDispatcher,
        shared: Arc<SessionShared>,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
        shutdown: Arc<Notify>,
        hello_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            dispatcher,
            shared,
            outbound_rx,
            shutdown,
            hello_timeout,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.run_loop().await {
            self.shared.fail(e.to_string());
        }

        self.outbound_rx.close();
        self.dispatcher.stop_heartbeat().await;
        if self.connection.is_connected() {
            let _ = self.connection.disconnect().await;
        }
        info!("Gateway connection task terminated");
    }

    async fn run_loop(&mut self) -> GatewayResult<()> {
        let mut last_frame = Instant::now();

        loop {
            let deadline = last_frame + self.receive_timeout();

            tokio::select! {
                result = self.connection.receive() => {
                    let text = result?;
                    last_frame = Instant::now();
                    trace!(bytes = text.len(), "Frame received");

                    for reply in self.dispatcher.dispatch(&text)? {
                        self.connection
                            .send(&reply)
                            .await
                            .map_err(|e| GatewayError::send_failed(e.to_string()))?;
                    }
                }

                Some(frame) = self.outbound_rx.recv() => {
                    let result = self.connection.send(&frame.text).await;
                    let failure = result.as_ref().err().map(ToString::to_string);

                    if let Some(ack) = frame.ack {
                        let _ = ack.send(result);
                    }
                    if let Some(message) = failure {
                        return Err(GatewayError::send_failed(message));
                    }
                }

                () = sleep_until(deadline) => {
                    return Err(GatewayError::timeout("inbound frame"));
                }

                () = self.shutdown.notified() => {
                    debug!("Connection task shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn receive_timeout(&self) -> Duration {
        self.shared
            .heartbeat_interval()
            .unwrap_or(self.hello_timeout)
    }
}
