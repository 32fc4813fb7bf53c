//! Fanout hub types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of a registered downstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected downstream peer as seen by the hub
#[derive(Debug)]
pub struct DownstreamClient {
    /// Remote address, if known
    pub peer: Option<SocketAddr>,
    /// When the client was registered
    pub connected_at: DateTime<Utc>,
    /// Outbound frame queue drained by the connection's writer task
    pub outbound: mpsc::Sender<String>,
}

impl DownstreamClient {
    pub fn new(peer: Option<SocketAddr>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            peer,
            connected_at: Utc::now(),
            outbound,
        }
    }
}

/// Frame sent to every downstream client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesFrame {
    pub prices: Vec<u64>,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients the frame was queued for
    pub delivered: usize,
    /// Clients whose queue was full; frame dropped for them
    pub dropped: usize,
    /// Send failures; each client listed here was removed
    pub failures: Vec<HubError>,
}

impl BroadcastReport {
    /// Number of clients removed by this broadcast
    pub fn removed(&self) -> usize {
        self.failures.len()
    }
}

/// Hub errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Client's outbound queue is closed
    #[error("Send to client {client} failed")]
    SendFailure { client: ClientId },
}

impl HubError {
    /// Client the error concerns
    pub fn client(&self) -> ClientId {
        match self {
            HubError::SendFailure { client } => *client,
        }
    }
}
