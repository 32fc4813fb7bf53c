//! Upstream wire types, client settings and errors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Stork oracle WebSocket endpoint
pub const STORK_WS_URL: &str = "wss://api.jp.stork-oracle.network/evm/subscribe";

/// Upstream client settings
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// WebSocket URL to connect to
    pub url: String,
    /// Credential sent as `Authorization: Basic <credential>`
    pub credential: String,
    /// Symbols named in the subscription request
    pub symbols: Vec<String>,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// Timeout for pong response
    pub pong_timeout: Duration,
    /// Capacity of the event and outbound channels
    pub buffer_size: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: STORK_WS_URL.to_string(),
            credential: String::new(),
            symbols: vec!["BTCUSD".to_string()],
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            buffer_size: 1024,
        }
    }
}

impl UpstreamSettings {
    /// Create settings for the given URL and credential
    pub fn new(url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: credential.into(),
            ..Default::default()
        }
    }

    /// Set the subscription symbols
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Set pong timeout
    pub fn pong_timeout(mut self, d: Duration) -> Self {
        self.pong_timeout = d;
        self
    }

    /// Set channel capacity
    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = n;
        self
    }
}

/// Price entry for one symbol inside an `oracle_prices` frame
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SymbolPrice {
    /// Decimal-encoded price string
    #[serde(default)]
    pub price: Option<String>,
}

/// Decoded upstream frame, tagged by its `type` field
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamMessage {
    /// Price update keyed by symbol
    OraclePrices {
        #[serde(default)]
        data: HashMap<String, SymbolPrice>,
    },
    /// Any other frame type (subscription acks, errors, ...)
    #[serde(other)]
    Other,
}

impl UpstreamMessage {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, UpstreamError> {
        serde_json::from_str(text).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Decode a binary frame, which must be UTF-8 text
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, UpstreamError> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Self::decode(text)
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamMessage::OraclePrices { .. } => "oracle_prices",
            UpstreamMessage::Other => "other",
        }
    }
}

/// Subscription request sent once per connection
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    data: &'a [String],
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(symbols: &'a [String]) -> Self {
        Self {
            msg_type: "subscribe",
            data: symbols,
        }
    }
}

/// Events produced by an upstream session
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// A successfully decoded frame
    Message(UpstreamMessage),
    /// Connection lost; terminal for this session
    Disconnected { reason: String },
}

/// Upstream errors
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Handshake or transport failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Request could not be built (bad URL or credential characters)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Malformed upstream frame
    #[error("Decode error: {0}")]
    Decode(String),
    /// Write to the socket failed
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Connection task is gone
    #[error("Channel closed")]
    ChannelClosed,
}
