//! Per-downstream connection lifecycle

use crate::hub::{ClientId, DownstreamClient, FanoutHub};
use crate::telemetry::{self, CounterMetric};
use crate::upstream::UpstreamSender;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Time the writer gets to flush the close handshake after the client leaves
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of one downstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP accepted, WebSocket handshake pending
    Connecting,
    /// In the hub, receiving broadcasts
    Registered(ClientId),
    /// Removed from the hub; terminal
    Unregistered,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Registered(id) => write!(f, "registered({})", id),
            ConnectionState::Unregistered => write!(f, "unregistered"),
        }
    }
}

/// Serve one downstream client until it disconnects.
///
/// The client is registered as soon as the handshake completes. Text it
/// sends is forwarded upstream verbatim. A dedicated writer task drains the
/// client's queue so a slow socket only ever delays itself.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: FanoutHub,
    upstream: UpstreamSender,
    client_buffer: usize,
) -> ConnectionState {
    tracing::trace!(%peer, state = %ConnectionState::Connecting, "Downstream accepted");

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "Downstream handshake failed");
            return ConnectionState::Unregistered;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<String>(client_buffer);

    let id = hub.register(DownstreamClient::new(Some(peer), tx));
    let state = ConnectionState::Registered(id);
    tracing::debug!(%peer, state = %state, "Downstream connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write.send(Message::Text(frame)).await {
                tracing::debug!(error = %e, "Downstream write failed");
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(
                            client = %id,
                            len = text.len(),
                            "Forwarding downstream message"
                        );
                        telemetry::increment(CounterMetric::ForwardedMessages);
                        if let Err(e) = upstream.forward(text).await {
                            tracing::warn!(
                                client = %id,
                                error = %e,
                                "Upstream unavailable, message dropped"
                            );
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(client = %id, len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(client = %id, error = %e, "Downstream read failed");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    // Dropping the hub's sender ends the writer's queue, so it drains and
    // sends the close reply
    hub.unregister(id);
    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        tracing::debug!(client = %id, "Downstream close timed out");
        writer.abort();
    }

    let state = ConnectionState::Unregistered;
    tracing::debug!(%peer, state = %state, "Downstream closed");
    state
}
