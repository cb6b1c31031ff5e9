//! Mirror Relay — screen mirroring signaling and relay server.
//!
//! A single-process server that lets one sender device publish a screen
//! stream and any number of receivers subscribe to it, multiplexed over one
//! WebSocket per client with a JSON RPC control channel.
//!
//! Usage:
//!   mirror-relay                     # Default port 8765
//!   mirror-relay --port 9000         # Custom port
//!   mirror-relay --verbose           # Debug logging

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use relay_server::{RelayServer, StreamRegistry};
use relay_transport::{TransportConfig, TransportServer};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mirror-relay", about = "Mirror Relay — screen stream signaling and relay")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "32")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .unwrap_or_else(|e| panic!("Failed to open log file {}: {e}", log_path.display()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let streams = Arc::new(StreamRegistry::new());
    let server = Arc::new(RelayServer::new(streams));

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        max_connections: Some(cli.max_connections),
        ..TransportConfig::default()
    };

    let mut transport = match TransportServer::start(config, server).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let port = transport.port();
    println!();
    println!("  Mirror Relay running on ws://{}:{}/ws", cli.hostname, port);
    println!();
    println!("  To connect a device over USB, run:");
    println!("    adb reverse tcp:{port} tcp:{port}");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.ok();

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
}
