//! Sous daemon - streaming chat relay for the recipe assistant

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sous::config::Config;
use sous::error::Result;
use sous::relay::OpenAiConnector;
use sous::server::RelayServer;

/// Sous - streaming chat relay for a recipe assistant
#[derive(Parser)]
#[command(name = "sous")]
#[command(about = "Streams chat completions from a model provider to the recipe assistant UI")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Listen port, keeping the host of the configured or `--listen` address
    #[arg(long, env = "PORT", global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config, cli.listen, cli.port).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sous=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(
    config_path: Option<PathBuf>,
    listen: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    tracing::info!("Starting Sous relay");

    let mut config = Config::load(config_path.as_deref())?;

    config.server.apply_overrides(listen, port);
    tracing::debug!("Config loaded: {:?}", config);

    let connector = OpenAiConnector::from_config(&config.upstream)?;
    tracing::info!(
        "Relaying to {} with model {}",
        connector.endpoint(),
        config.upstream.model
    );

    let server = RelayServer::new(config.server, config.relay, Arc::new(connector));
    server.serve().await?;

    tracing::info!("Sous relay stopped");
    Ok(())
}
