//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use whalewatch_core::config;
use whalewatch_core::feed::StreamKind;

mod commands;

#[derive(Parser)]
#[command(name = "whalewatch")]
#[command(version)]
#[command(about = "Live terminal monitor for large crypto trades and liquidations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use (default: $WHALEWATCH_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "WHALEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Disable audio alerts
    #[arg(long = "no-sound", global = true)]
    no_sound: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Watch large spot trades
    Trades {
        /// Trading pair to watch, e.g. btcusdt (repeatable; default: config pairs)
        #[arg(short = 'p', long = "pair", value_name = "PAIR")]
        pairs: Vec<String>,

        /// Ignore trades below this notional value (USD)
        #[arg(short = 'm', long = "min-value", value_name = "USD")]
        min_value: Option<f64>,
    },

    /// Watch forced liquidation orders
    Liquidations {
        /// Trading pair to watch, e.g. btcusdt (repeatable; default: config pairs)
        #[arg(short = 'p', long = "pair", value_name = "PAIR")]
        pairs: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::paths::config_path);

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path(&config_path);
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(&config_path),
        },
        Commands::Trades { pairs, min_value } => {
            let options = commands::monitor::MonitorOptions {
                config_path,
                kind: StreamKind::Trades,
                pairs,
                min_value,
                no_sound: cli.no_sound,
            };
            block_on(commands::monitor::run(options))
        }
        Commands::Liquidations { pairs } => {
            let options = commands::monitor::MonitorOptions {
                config_path,
                kind: StreamKind::Liquidations,
                pairs,
                min_value: None,
                no_sound: cli.no_sound,
            };
            block_on(commands::monitor::run(options))
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(future)
}
