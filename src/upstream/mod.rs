//! Upstream price feed
//!
//! Maintains one authenticated WebSocket connection to the Stork oracle,
//! sends the subscription request and decodes inbound frames into events.

mod client;
mod types;

pub use client::{UpstreamClient, UpstreamSender, UpstreamSession};
pub use types::{
    SubscribeRequest, SymbolPrice, UpstreamError, UpstreamEvent, UpstreamMessage,
    UpstreamSettings, STORK_WS_URL,
};

use async_trait::async_trait;

/// Trait for upstream feed implementations
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Open one session; the session ends with `UpstreamEvent::Disconnected`
    async fn connect(&self) -> Result<UpstreamSession, UpstreamError>;
}
