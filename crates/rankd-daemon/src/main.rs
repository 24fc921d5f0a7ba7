//! rankd - ranked leaderboard daemon.
//!
//! Wires configuration, the `SQLite` score store, the fail-open cache, and
//! the Unix-socket API server together, then runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rankd_core::cache::{Cache, MemoryCacheStore};
use rankd_core::config::RankdConfig;
use rankd_daemon::handlers::ServerContext;
use rankd_daemon::server;
use rankd_daemon::service::Leaderboard;
use rankd_daemon::store::ScoreStore;
use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// rankd daemon - ranked leaderboard service
#[derive(Parser, Debug)]
#[command(name = "rankd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Path to the Unix socket to serve on (overrides config)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// TTL in seconds for the cached top-10 projection (overrides config)
    #[arg(long)]
    top_ttl_secs: Option<u64>,

    /// TTL in seconds for cached per-player rank projections (overrides
    /// config)
    #[arg(long)]
    rank_ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => RankdConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RankdConfig::default(),
    };

    // CLI flags override individual config fields.
    if let Some(db) = args.db {
        config.store.db_path = db;
    }
    if let Some(socket) = args.socket {
        config.daemon.socket = socket;
    }
    if let Some(ttl) = args.top_ttl_secs {
        config.cache.top_ttl_secs = ttl;
    }
    if let Some(ttl) = args.rank_ttl_secs {
        config.cache.rank_ttl_secs = ttl;
    }

    if let Some(parent) = config.store.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }

    let store = ScoreStore::open(
        &config.store.db_path,
        Duration::from_millis(config.store.busy_timeout_ms),
    )
    .with_context(|| format!("opening score store at {}", config.store.db_path.display()))?;

    let cache = Cache::new(Arc::new(MemoryCacheStore::new()));
    let leaderboard = Leaderboard::new(
        store,
        cache,
        Duration::from_secs(config.cache.top_ttl_secs),
        Duration::from_secs(config.cache.rank_ttl_secs),
    );
    let ctx = Arc::new(ServerContext::new(leaderboard));

    let socket_path = config.daemon.socket.clone();
    if let Some(parent) = socket_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating socket directory {}", parent.display()))?;
        }
    }
    // Remove a stale socket from a previous run.
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    info!(socket = %socket_path.display(), "rankd started");

    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::select! {
        result = server::serve(listener, ctx) => {
            if let Err(e) = result {
                warn!(error = %e, "server loop exited with error");
            }
        },
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!(error = %e, "failed to remove socket on shutdown");
    }
    info!("rankd stopped");
    Ok(())
}
