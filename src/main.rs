//! Permission-gated chat server - Entry Point
//!
//! Loads configuration, opens the account store, starts the ChatServer actor
//! and accepts connections until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use permchat::config::ServerConfig;
use permchat::store::MemoryStore;
use permchat::{lookup, serve, ChatServer};

#[derive(Parser, Debug)]
#[command(name = "permchat", version, about = "Permission-gated multi-room chat server")]
struct Args {
    /// Path to a TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Account snapshot file, overriding the config file
    #[arg(long)]
    users_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG to control log level, e.g. RUST_LOG=permchat=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("permchat=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(users_file) = args.users_file {
        config.users_file = Some(users_file);
    }

    let store = match &config.users_file {
        Some(path) => MemoryStore::open(path)?,
        None => MemoryStore::new(),
    };
    info!(accounts = store.len(), "Account store ready");

    let listener = TcpListener::bind(&config.bind).await?;
    let local_addr = listener.local_addr()?;
    info!("{} listening on {}", config.chat_name, local_addr);

    let shutdown = CancellationToken::new();
    let ctx = ChatServer::spawn(&config, Arc::new(store), shutdown.clone());

    if let Some(lookup) = &config.lookup {
        let port = lookup.port.unwrap_or(local_addr.port());
        match lookup::announce(&lookup.addr, &config.chat_name, port).await {
            Ok(reply) => info!("Lookup service replied: {}", reply),
            Err(e) => warn!("Could not register with lookup service at {}: {}", lookup.addr, e),
        }
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    serve(listener, ctx).await;

    // Give the actor a moment to flush the shutdown notice
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!("Server stopped");
    Ok(())
}
