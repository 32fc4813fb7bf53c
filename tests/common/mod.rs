//! Shared fixtures for relay integration tests

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stork_relay::hub::FanoutHub;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Mock upstream feed accepting a single connection
pub struct MockUpstream {
    pub addr: SocketAddr,
    auth: Arc<Mutex<Option<String>>>,
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<Message>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let auth = Arc::new(Mutex::new(None));
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Message>();

        let auth_slot = auth.clone();
        tokio::spawn(async move {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            let callback =
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *auth_slot.lock() = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    Ok(resp)
                };

            let ws_stream = match accept_hdr_async(stream, callback).await {
                Ok(ws) => ws,
                Err(_) => return,
            };
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text);
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        }
                    }
                    out = push_rx.recv() => {
                        match out {
                            Some(Message::Close(frame)) => {
                                let _ = write.send(Message::Close(frame)).await;
                                break;
                            }
                            Some(msg) => {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Self {
            addr,
            auth,
            received,
            push,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Authorization header seen during the handshake
    pub fn auth_header(&self) -> Option<String> {
        self.auth.lock().clone()
    }

    pub fn push_text(&self, text: &str) {
        self.push.send(Message::Text(text.to_string())).unwrap();
    }

    pub fn close(&self) {
        self.push.send(Message::Close(None)).unwrap();
    }

    /// Next text frame the relay sent upstream
    pub async fn next_received(&mut self) -> String {
        tokio::time::timeout(TIMEOUT, self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("mock upstream closed")
    }
}

pub async fn connect_client(addr: SocketAddr) -> ClientStream {
    let (ws_stream, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws_stream
}

/// Next text frame delivered to a downstream client
pub async fn next_text(client: &mut ClientStream) -> String {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for relay frame")
            .expect("relay closed connection")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

/// Poll until the hub holds exactly `n` clients
pub async fn wait_for_clients(hub: &FanoutHub, n: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while hub.client_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for client count");
}
