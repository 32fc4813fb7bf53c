//! Upstream WebSocket client: one authenticated connection per session

use super::types::{
    SubscribeRequest, UpstreamError, UpstreamEvent, UpstreamMessage, UpstreamSettings,
};
use super::PriceFeed;
use crate::telemetry::{self, CounterMetric};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Cloneable handle for writing frames to the upstream connection.
///
/// All writes go through the connection task, so concurrent callers never
/// interleave frames on the socket.
#[derive(Debug, Clone)]
pub struct UpstreamSender {
    tx: mpsc::Sender<String>,
}

impl UpstreamSender {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue a text frame for upstream, unmodified
    pub async fn forward(&self, text: String) -> Result<(), UpstreamError> {
        self.tx
            .send(text)
            .await
            .map_err(|_| UpstreamError::ChannelClosed)
    }

    /// Whether the connection task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live upstream connection: decoded events in, raw frames out
#[derive(Debug)]
pub struct UpstreamSession {
    pub events: mpsc::Receiver<UpstreamEvent>,
    pub sender: UpstreamSender,
}

impl UpstreamSession {
    pub fn new(events: mpsc::Receiver<UpstreamEvent>, sender: UpstreamSender) -> Self {
        Self { events, sender }
    }
}

/// Client for the upstream price feed.
///
/// `connect` establishes exactly one connection and never reconnects; wrap
/// it in a retry loop if a longer-lived feed is needed.
pub struct UpstreamClient {
    settings: UpstreamSettings,
}

impl UpstreamClient {
    /// Create a new client with the given settings
    pub fn new(settings: UpstreamSettings) -> Self {
        Self { settings }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.settings.url
    }

    /// Build the handshake request with the Basic authorization header
    fn build_request(&self) -> Result<Request, UpstreamError> {
        let mut request = self
            .settings
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Basic {}", self.settings.credential))
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        Ok(request)
    }

    /// Connect, subscribe, and spawn the connection task
    pub async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
        let request = self.build_request()?;

        tracing::info!(url = %self.settings.url, "Connecting to upstream feed");

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| UpstreamError::ConnectionFailed(e.to_string()))?;

        let (mut write, read) = ws_stream.split();

        let subscribe = serde_json::to_string(&SubscribeRequest::new(&self.settings.symbols))
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| UpstreamError::SendFailed(e.to_string()))?;

        tracing::info!(symbols = ?self.settings.symbols, "Upstream connected, subscription sent");

        let (event_tx, event_rx) = mpsc::channel(self.settings.buffer_size);
        let (send_tx, send_rx) = mpsc::channel(self.settings.buffer_size);
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let reason = match run_connection(&settings, write, read, &event_tx, send_rx).await {
                Ok(()) => "closed".to_string(),
                Err(e) => e.to_string(),
            };
            tracing::warn!(reason = %reason, "Upstream disconnected");
            let _ = event_tx.send(UpstreamEvent::Disconnected { reason }).await;
        });

        Ok(UpstreamSession::new(event_rx, UpstreamSender::new(send_tx)))
    }
}

#[async_trait]
impl PriceFeed for UpstreamClient {
    async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
        UpstreamClient::connect(self).await
    }
}

/// Decode one text frame and emit it; malformed frames are logged and dropped
async fn emit_frame(
    decoded: Result<UpstreamMessage, UpstreamError>,
    preview: impl FnOnce() -> String,
    event_tx: &mpsc::Sender<UpstreamEvent>,
) -> bool {
    telemetry::increment(CounterMetric::UpstreamFrames);
    match decoded {
        Ok(msg) => {
            tracing::trace!(kind = msg.kind(), "Upstream frame");
            event_tx.send(UpstreamEvent::Message(msg)).await.is_ok()
        }
        Err(e) => {
            telemetry::increment(CounterMetric::DecodeErrors);
            tracing::warn!(error = %e, preview = %preview(), "Dropping malformed upstream frame");
            true
        }
    }
}

/// Pump frames both ways until the connection ends
async fn run_connection<W, R>(
    settings: &UpstreamSettings,
    mut write: W,
    mut read: R,
    event_tx: &mpsc::Sender<UpstreamEvent>,
    mut send_rx: mpsc::Receiver<String>,
) -> Result<(), UpstreamError>
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut ping_interval = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        let pong_wait = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let decoded = UpstreamMessage::decode(&text);
                        let preview = || text.chars().take(100).collect::<String>();
                        if !emit_frame(decoded, preview, event_tx).await {
                            tracing::debug!("Event receiver dropped, closing upstream");
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let decoded = UpstreamMessage::decode_bytes(&data);
                        let preview = || format!("<{} bytes>", data.len());
                        if !emit_frame(decoded, preview, event_tx).await {
                            tracing::debug!("Event receiver dropped, closing upstream");
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await
                            .map_err(|e| UpstreamError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Received close frame from upstream");
                        return Ok(());
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        return Err(UpstreamError::ConnectionFailed(e.to_string()));
                    }
                    None => {
                        return Err(UpstreamError::ConnectionFailed("Stream ended unexpectedly".into()));
                    }
                }
            }

            outbound = send_rx.recv() => {
                match outbound {
                    Some(text) => {
                        tracing::debug!(len = text.len(), "Forwarding frame upstream");
                        write.send(Message::Text(text)).await
                            .map_err(|e| UpstreamError::SendFailed(e.to_string()))?;
                    }
                    None => {
                        // Every sender dropped
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            _ = ping_interval.tick() => {
                write.send(Message::Ping(Vec::new())).await
                    .map_err(|e| UpstreamError::SendFailed(e.to_string()))?;
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + settings.pong_timeout);
                }
            }

            _ = pong_wait => {
                return Err(UpstreamError::ConnectionFailed("Pong timeout".into()));
            }
        }
    }
}
