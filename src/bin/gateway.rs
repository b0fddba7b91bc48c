//! Speech gateway CLI binary.
//!
//! # Commands
//!
//! - `serve` - Start the gateway
//! - `routes` - Print the validated route table

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gateway::{Config, Gateway, RouteTable, VERSION};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speech-gateway")]
#[command(version = VERSION)]
#[command(about = "Edge gateway for speech-to-text and chat providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve {
        /// Listen port (overrides config and GATEWAY_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host (overrides config and GATEWAY_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Print the route table
    Routes {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            config,
            verbose,
            json_logs,
        } => cmd_serve(port, host, config, verbose, json_logs),

        Commands::Routes { config } => cmd_routes(config),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cmd_serve(
    port: Option<u16>,
    host: Option<String>,
    config_path: Option<PathBuf>,
    verbose: bool,
    json_logs: bool,
) -> anyhow::Result<()> {
    init_logging(verbose, json_logs);

    let mut config = Config::load(config_path).context("loading configuration")?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let gateway = Gateway::new(config).context("building gateway")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let shutdown = Box::pin(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        });
        gateway.run(shutdown).await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_routes(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("loading configuration")?;
    let table = RouteTable::from_config(&config.routes).context("validating routes")?;

    println!("{:<8} {:<28} {:<20}", "Method", "Path", "Handler");
    println!("{}", "-".repeat(58));
    println!("{:<8} {:<28} {:<20}", "ANY", table.health_path(), "health");
    for route in table.routes() {
        println!(
            "{:<8} {:<28} {:<20}",
            route.method.to_string(),
            route.path,
            route.handler.name()
        );
    }

    Ok(())
}
