//! stork-relay: WebSocket relay for Stork oracle prices
//!
//! This library provides the core components for:
//! - A single authenticated upstream connection to the Stork price feed
//! - Extraction of the relayed symbol's price from `oracle_prices` frames
//! - Best-effort fanout of `{"prices": [...]}` frames to local clients
//! - A downstream WebSocket server with an upstream pass-through channel
//! - Configuration, structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod extractor;
pub mod hub;
pub mod relay;
pub mod telemetry;
pub mod upstream;
