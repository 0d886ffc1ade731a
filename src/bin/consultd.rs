//! Consultation chat daemon
//!
//! Serves the real-time doctor/patient chat over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon with the default config location
//! consultd serve
//!
//! # Start with an explicit config file
//! consultd --config /etc/consult/consultd.toml serve
//!
//! # Validate a config file and exit
//! consultd --config ./consultd.toml check-config
//!
//! # Override the bind address and enable debug logging
//! CONSULT_BIND=127.0.0.1:9000 RUST_LOG=consultd=debug consultd serve
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use consultd::config::Config;
use consultd::hub::{spawn_hub, watch_session_ends};
use consultd::server::{AppState, ChatServer};
use consultd::store::Stores;

/// Consultation chat daemon
#[derive(Parser, Debug)]
#[command(name = "consultd", version, about)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "CONSULT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_daemon(config),
        Command::CheckConfig => {
            println!("Configuration OK");
            println!("  bind: {}", config.server.bind);
            println!("  outbound queue: {}", config.chat.outbound_capacity);
            println!("  seeded sessions: {}", config.sessions.len());
            println!("  seeded profiles: {}", config.profiles.len());
            Ok(())
        }
    }
}

/// Initializes tracing. `RUST_LOG` wins over the configured filter.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Consultation chat daemon starting"
    );

    let addr = config.bind_addr()?;

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let stores = Stores::in_memory(&config);
    info!(
        sessions = config.sessions.len(),
        profiles = config.profiles.len(),
        "In-memory stores seeded"
    );

    let hub = spawn_hub(config.chat.command_buffer);
    let _watcher = watch_session_ends(hub.clone(), stores.sessions.subscribe_ended());
    info!("Session hub started");

    let server = ChatServer::new(addr, AppState::new(hub, stores, config.chat), cancel_token);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Consultation chat daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
