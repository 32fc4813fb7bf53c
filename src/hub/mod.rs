//! Downstream fanout
//!
//! Tracks connected downstream clients and broadcasts derived prices to
//! all of them with at-most-once, non-blocking delivery.

mod fanout;
mod types;

pub use fanout::FanoutHub;
pub use types::{BroadcastReport, ClientId, DownstreamClient, HubError, PricesFrame};
