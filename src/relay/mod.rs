//! Downstream relay server
//!
//! Accepts WebSocket clients, registers them with the fanout hub and
//! drives upstream events through the extractor into broadcasts.

mod connection;
mod server;

pub use connection::ConnectionState;
pub use server::{RelayError, RelayServer};
