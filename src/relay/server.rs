//! Relay server: downstream listener wired to the upstream feed

use super::connection::handle_connection;
use crate::config::RelayConfig;
use crate::extractor::PriceExtractor;
use crate::hub::FanoutHub;
use crate::telemetry::{self, CounterMetric};
use crate::upstream::{PriceFeed, UpstreamError, UpstreamEvent};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    /// Upstream connection could not be opened
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    /// Upstream session ended; terminal for this server run
    #[error("Upstream disconnected: {0}")]
    UpstreamDisconnected(String),
}

/// Accepts downstream clients and republishes upstream prices to them.
///
/// Owns the hub, the extractor and, while serving, the upstream session.
pub struct RelayServer<F> {
    config: RelayConfig,
    feed: F,
    extractor: PriceExtractor,
    hub: FanoutHub,
}

impl<F: PriceFeed> RelayServer<F> {
    pub fn new(config: RelayConfig, feed: F, extractor: PriceExtractor) -> Self {
        Self {
            config,
            feed,
            extractor,
            hub: FanoutHub::new(),
        }
    }

    /// Handle to the client registry
    pub fn hub(&self) -> FanoutHub {
        self.hub.clone()
    }

    /// Bind the downstream listener on the configured address
    pub async fn bind(&self) -> Result<TcpListener, RelayError> {
        let addr = self.config.addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })
    }

    /// Bind and serve until the upstream session ends
    pub async fn run(self) -> Result<(), RelayError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// Returns `UpstreamDisconnected` when the upstream session ends; every
    /// downstream connection is closed at that point.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RelayError> {
        let mut session = self.feed.connect().await?;
        let upstream = session.sender.clone();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, symbol = %self.extractor.symbol(), "Relay listening");
        }

        let mut connections = JoinSet::new();

        let reason = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            connections.spawn(handle_connection(
                                stream,
                                peer,
                                self.hub.clone(),
                                upstream.clone(),
                                self.config.client_buffer,
                            ));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                        }
                    }
                }

                event = session.events.recv() => {
                    match event {
                        Some(UpstreamEvent::Message(msg)) => {
                            if let Some(record) = self.extractor.extract(&msg) {
                                telemetry::increment(CounterMetric::RecordsExtracted);
                                self.hub.broadcast(&record);
                            }
                        }
                        Some(UpstreamEvent::Disconnected { reason }) => break reason,
                        None => break "event channel closed".to_string(),
                    }
                }

                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        tracing::warn!(
            reason = %reason,
            clients = self.hub.client_count(),
            "Upstream lost, closing relay"
        );
        connections.shutdown().await;
        self.hub.clear();

        Err(RelayError::UpstreamDisconnected(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{UpstreamSender, UpstreamSession};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    struct ChannelFeed {
        session: Mutex<Option<UpstreamSession>>,
    }

    #[async_trait]
    impl PriceFeed for ChannelFeed {
        async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
            self.session
                .lock()
                .take()
                .ok_or_else(|| UpstreamError::ConnectionFailed("already used".into()))
        }
    }

    fn local_config() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            client_buffer: 8,
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_surfaced() {
        let feed = ChannelFeed {
            session: Mutex::new(None),
        };
        let server = RelayServer::new(local_config(), feed, PriceExtractor::new("BTCUSD"));
        let listener = server.bind().await.unwrap();

        let result = server.serve(listener).await;
        assert!(matches!(result, Err(RelayError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_disconnect_event_ends_serve() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (send_tx, _send_rx) = mpsc::channel(8);
        let feed = ChannelFeed {
            session: Mutex::new(Some(UpstreamSession::new(
                event_rx,
                UpstreamSender::new(send_tx),
            ))),
        };
        let server = RelayServer::new(local_config(), feed, PriceExtractor::new("BTCUSD"));
        let listener = server.bind().await.unwrap();

        event_tx
            .send(UpstreamEvent::Disconnected {
                reason: "closed".to_string(),
            })
            .await
            .unwrap();

        let result = server.serve(listener).await;
        match result {
            Err(RelayError::UpstreamDisconnected(reason)) => assert_eq!(reason, "closed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            port: taken.local_addr().unwrap().port(),
            ..local_config()
        };
        let feed = ChannelFeed {
            session: Mutex::new(None),
        };
        let server = RelayServer::new(config, feed, PriceExtractor::new("BTCUSD"));
        assert!(matches!(server.bind().await, Err(RelayError::Bind { .. })));
    }
}
