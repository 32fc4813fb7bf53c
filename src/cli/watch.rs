//! Watch command implementation

use crate::hub::PricesFrame;
use clap::Args;
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8081")]
    pub url: String,

    /// Stop after this many price frames
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

impl WatchArgs {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await?;
        let (_write, mut read) = ws_stream.split();

        tracing::info!(url = %self.url, "Watching relay");

        let mut seen = 0usize;
        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<PricesFrame>(&text) {
                    Ok(frame) => {
                        tracing::info!(prices = ?frame.prices, "Price update");
                        seen += 1;
                        if self.count.is_some_and(|n| seen >= n) {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Unexpected frame from relay"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        tracing::info!(frames = seen, "Relay watch finished");
        Ok(())
    }
}
