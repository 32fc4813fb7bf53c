//! CLI interface for stork-relay
//!
//! Provides subcommands for:
//! - `run`: Start the relay
//! - `watch`: Connect as a downstream client and log prices
//! - `config`: Show the effective configuration

mod run;
mod watch;

pub use run::RunArgs;
pub use watch::WatchArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stork-relay")]
#[command(about = "Relays Stork oracle prices to local WebSocket clients")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay
    Run(RunArgs),
    /// Connect to a relay and log received prices
    Watch(WatchArgs),
    /// Show configuration
    Config,
}
