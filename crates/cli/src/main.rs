mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use ntbridge_protocol::translate_symbol;
use ntbridge_server::{BridgeServer, Dispatcher, LogLevel, Session};
use ntbridge_sim::SimulatedPlatform;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Let every bridge record through; the session threshold does the gating.
const DEFAULT_FILTER: &str = "warn,ntbridge=trace";

#[derive(Parser)]
#[command(name = "ntbridge")]
#[command(about = "TCP bridge exposing trading-platform accounts, prices and orders over a line protocol")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "NTBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Initial bridge log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge against the simulated platform until Ctrl-C
    Serve {
        /// Listen port (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the platform notation of client symbols
    Translate {
        /// Symbols such as MESH26 or "MES 0326"
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Load and validate the config, then print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match cli.log_format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Commands::Serve { port } => {
            let mut config = AppConfig::load(cli.config.as_deref())?;
            if let Some(level) = cli.log_level {
                config.bridge.log_level = level;
            }
            if let Some(port) = port {
                config.bridge.port = port;
            }
            run_bridge(config).await?;
        }
        Commands::Translate { symbols } => {
            for symbol in symbols {
                println!("{} -> {}", symbol, translate_symbol(&symbol));
            }
        }
        Commands::CheckConfig => {
            let config = AppConfig::load(cli.config.as_deref())?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_bridge(config: AppConfig) -> Result<()> {
    let platform = SimulatedPlatform::new(&config.simulation);
    let bars = platform.load_history(&config.simulation)?;
    info!(
        accounts = config.simulation.accounts.len(),
        instruments = config.simulation.instruments.len(),
        bars,
        "Simulated platform ready"
    );

    let session = Arc::new(Session::new(
        config.bridge.log_level,
        config.bridge.heartbeat_interval(),
    ));
    let dispatcher = Dispatcher::new(Arc::new(platform), Arc::clone(&session), &config.bridge);

    info!("Bridge starting...");
    let handle = BridgeServer::bind(&config.bridge, dispatcher).await?;
    info!(
        addr = %handle.local_addr(),
        log_level = %config.bridge.log_level,
        "Bridge running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    info!("Bridge stopping...");
    handle.shutdown().await;
    session.reset();
    Ok(())
}
