//! Spindle CLI — the main entry point.
//!
//! Commands:
//! - `demo`    — Run two agents playing ping/pong over the in-memory network
//! - `config`  — Print the effective (or default) configuration

use clap::{Parser, Subcommand};
use spindle_config::AppConfig;
use tracing_subscriber::fmt::MakeWriter;

mod commands;

#[derive(Parser)]
#[command(
    name = "spindle",
    about = "Spindle — behaviour engine for multi-agent systems",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a ping/pong exchange between two agents
    Demo {
        /// Number of ping/pong round trips
        #[arg(short, long, default_value_t = 3)]
        rounds: u32,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the loaded configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = with_bootstrap_logging(cli.verbose, std::io::stdout, AppConfig::load)?;

    // Initialize tracing
    let filter = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(filter))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(filter))
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Demo { rounds } => commands::demo::run(&config, rounds).await?,
        Commands::Config { default } => commands::config_cmd::show(&config, default),
    }

    Ok(())
}

/// Run `f` under a temporary subscriber writing to `writer`.
///
/// Config decides the final log level, so loading it cannot log through the
/// global subscriber.
fn with_bootstrap_logging<T, W>(verbose: bool, writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(if verbose { "debug" } else { "info" }))
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

/// `RUST_LOG` wins over the given fallback directive.
fn env_filter(fallback: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
}
