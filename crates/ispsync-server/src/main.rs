//! ispsync server
//!
//! Hosts the integration layer of the ISP platform:
//! - Sweeps the configured provider connections at startup
//! - Checks the configured ISP database at startup
//! - Serves live customer-map updates over `/ws/map-updates`
//! - Accepts entity-mutation reports on `/hooks/entity-mutations`
//!
//! Usage:
//! ```bash
//! ispsync-server --config ispsync.yaml
//!
//! # Environment variables override the file
//! ISPSYNC_PORT=9000 ISPSYNC_LOG_JSON=true ispsync-server --config ispsync.yaml
//! ```

mod app;
mod config;
mod startup;

use anyhow::Context;
use app::{AppState, build_router};
use clap::Parser;
use config::ServerConfig;
use ispsync_egress::ProviderRegistry;
use ispsync_realtime::{CacheInvalidationHook, InMemoryCache, TenantEventBus};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// ispsync - external integration and synchronization server
#[derive(Parser)]
#[command(name = "ispsync-server", version)]
#[command(about = "Integration and real-time sync server for the ISP platform", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "ISPSYNC_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ServerConfig::default(),
    };
    config.merge_env();
    config.resolve_secrets()?;

    init_tracing(&config)?;
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("Using default configuration"),
    }

    let registry = ProviderRegistry::new();
    startup::validate_providers(&registry, &config.providers)
        .context("Invalid provider configuration")?;
    if !config.providers.is_empty() {
        tokio::spawn(startup::sweep_providers(registry, config.providers.clone()));
    }
    if let Some(database) = config.database.clone() {
        tokio::spawn(startup::check_database(database));
    }

    let bus = TenantEventBus::global();
    let cache = Arc::new(InMemoryCache::with_default_ttl(config.cache.ttl()));
    let state = AppState {
        hook: CacheInvalidationHook::new(cache, bus.clone()),
    };
    let router = build_router(state, bus, config.realtime.enabled);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    info!("ispsync server listening on http://{}", addr);
    info!("   Health:        http://{}/health", addr);
    info!("   Mutation hook: http://{}/hooks/entity-mutations", addr);
    if config.realtime.enabled {
        info!("   Map updates:   ws://{}{}", addr, ispsync_realtime::ws::MAP_UPDATES_PATH);
    } else {
        info!("   Map updates:   disabled");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over `logging.level`
fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install JSON logger: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
