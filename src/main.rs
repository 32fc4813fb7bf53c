use clap::Parser;
use stork_relay::cli::{Cli, Commands};
use stork_relay::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.apply_env()?;

    // Initialize telemetry
    stork_relay::telemetry::init_telemetry(&config.telemetry)?;
    config.validate()?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting relay");
            args.execute(&config).await?;
        }
        Commands::Watch(args) => {
            args.execute().await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Upstream: {}", config.upstream.url);
            println!("  Symbols: {:?}", config.upstream.symbols);
            println!("  Relayed symbol: {}", config.upstream.price_symbol);
            println!("  Listen: {}", config.relay.addr());
            println!("  Client buffer: {}", config.relay.client_buffer);
            println!("  Credential: {}", config.masked_credential());
            println!(
                "  Telemetry: level={}, metrics_port={:?}",
                config.telemetry.log_level, config.telemetry.metrics_port
            );
        }
    }

    Ok(())
}
