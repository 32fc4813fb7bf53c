//! Run command implementation

use crate::config::Config;
use crate::extractor::PriceExtractor;
use crate::relay::RelayServer;
use crate::upstream::UpstreamClient;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the listening port
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(port) = self.port {
            config.relay.port = port;
        }

        let settings = config.upstream_settings()?;
        tracing::info!(credential = %config.masked_credential(), "Upstream credential loaded");

        let server = RelayServer::new(
            config.relay.clone(),
            UpstreamClient::new(settings),
            PriceExtractor::new(&config.upstream.price_symbol),
        );

        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
        }

        Ok(())
    }
}
