//! tagmodifier - MQTT tag-prefixing bridge
//!
//! Subscribes to the configured topics, prefixes every item name in each
//! payload and republishes the result to the topic it arrived on.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tagmodifier::bridge::Bridge;
use tagmodifier::config::{BridgeConfig, ConfigError};
use tagmodifier::observability::{init_default_logging, MetricsCollector};
use tagmodifier::transport::mqtt::MqttClient;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// MQTT bridge that prefixes item names in time-series payloads
#[derive(Parser)]
#[command(name = "tagmodifier")]
#[command(about = "Prefix item names in MQTT time-series payloads and republish them")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML); overrides BROKER/TOPIC/PREFIX
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run the bridge (default)
    Run,
    /// Run against a broker on 127.0.0.1, topic `timeseries_data`, prefix `prefix`
    Local,
    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting tagmodifier v{}", env!("CARGO_PKG_VERSION"));

    let command = cli.command.unwrap_or(Commands::Run);

    let config = match load_configuration(command, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            if let ConfigError::EnvVarNotFound(_) = e {
                eprintln!("Not all of your environment variables are set ({e})");
            } else {
                eprintln!("tagmodifier: {e}");
            }
            process::exit(1);
        }
    };

    let result = match command {
        Commands::Run | Commands::Local => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("tagmodifier: {e}");
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    command: Commands,
    config_path: Option<&Path>,
) -> Result<BridgeConfig, ConfigError> {
    if let Commands::Local = command {
        info!("Using local development configuration");
        return Ok(BridgeConfig::local());
    }

    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            BridgeConfig::load_from_file(path)
        }
        None => BridgeConfig::from_env(),
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        broker = %config.broker.address,
        topics = ?config.bridge.topics,
        prefix = %config.bridge.prefix,
        "Bridge starting"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let mut client = MqttClient::new(&config, metrics.clone())?;
    let bridge = Bridge::new(client.publisher(), config.bridge.prefix.clone(), metrics.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    let result = bridge.run(&mut client, shutdown_rx).await;

    info!("Bridge shutdown initiated");
    if let Err(e) = client.disconnect().await {
        error!("Error during disconnect: {}", e);
    }

    match serde_json::to_string(&metrics.get_metrics()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }

    let reason = result?;
    info!(reason = ?reason, "Bridge stopped");
    Ok(())
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
