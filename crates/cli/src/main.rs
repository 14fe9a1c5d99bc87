use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nexum_apdu_transport_pcsc::PcscDeviceManager;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(version, about = "Smart-card reader CLI: list readers, watch cards, exchange APDUs")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Reader configuration file (defaults to ~/.nxm/reader.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Trace level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers and card presence
    List,

    /// Print card insert and remove events until interrupted
    Watch,

    /// Wait for a card, send each APDU and print the responses
    Transmit {
        /// Command APDUs as hex strings
        #[arg(required = true)]
        apdus: Vec<String>,

        /// Seconds to wait for a card
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let manager = PcscDeviceManager::new()?;

    match cli.command {
        Commands::List => commands::list_readers(&manager),
        Commands::Watch => {
            let config = config::load_config(cli.config.as_deref())?;
            commands::watch(&manager, cli.reader.as_deref(), &config)
        }
        Commands::Transmit { apdus, timeout } => {
            let config = config::load_config(cli.config.as_deref())?;
            commands::transmit(
                &manager,
                cli.reader.as_deref(),
                &config,
                &apdus,
                Duration::from_secs(timeout),
            )
        }
    }
}

fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, &directives))
        .with_ansi(true)
        .init();
}

/// `RUST_LOG`-style directives on top of the level picked by `--verbose`
fn log_filter(verbose: bool, directives: &str) -> EnvFilter {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
