use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewall::config::RatewallConfig;
use ratewall::http::{router, AppState};
use ratewall::ratelimit::{BlockList, FallbackStore, LocalStore, RateLimiter};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "ratewall")]
#[command(about = "Rate limiting and abuse blocking for OTP, chat and API routes")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Ratewall");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = RatewallConfig::load(args.config.as_deref())?;
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // One local store for the process lifetime, swept in the background
    let local = Arc::new(LocalStore::new());
    let sweeper = local.spawn_sweeper(config.store.sweep_interval());

    let stores = Arc::new(FallbackStore::from_config(&config.store, local)?);
    let state = AppState {
        limiter: Arc::new(RateLimiter::new(stores.clone())),
        blocks: Arc::new(BlockList::new(stores)),
    };

    let listener = tokio::net::TcpListener::bind(config.server.http_addr).await?;
    info!("Listening on {}", config.server.http_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("Ratewall stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
