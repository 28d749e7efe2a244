//! warpregd — the WarpReg daemon.
//!
//! Assembles the registry service:
//! - Worker store (redb or JSON file)
//! - HTTP prober + fixed-delay retry
//! - Registry with its periodic health sweep
//! - HTTP API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! warpregd serve --config /etc/warpreg/warpreg.toml --port 8080
//! warpregd check-config --config /etc/warpreg/warpreg.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warpreg_api::{ApiState, build_router};
use warpreg_core::RegistryConfig;
use warpreg_health::{HttpProber, RetryPolicy};
use warpreg_metrics::RegistryMetrics;
use warpreg_registry::Registry;

const DEFAULT_FILTER: &str = "info,warpreg=debug";

#[derive(Parser)]
#[command(name = "warpregd", about = "WarpReg worker registry daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the registry service.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Override `store.path`.
        #[arg(long)]
        store_path: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file and print it with defaults filled in.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            store_path,
            json,
        } => {
            let config = load_config(&config, port, store_path)?;
            init_tracing(&config.log_level, json);
            run_serve(config).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(&config, None, None)?;
            println!("{}", config.to_toml_string()?);
            println!("configuration OK");
            Ok(())
        }
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(
    path: &Path,
    port: Option<u16>,
    store_path: Option<PathBuf>,
) -> anyhow::Result<RegistryConfig> {
    let mut config = RegistryConfig::from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(store_path) = store_path {
        config.store.path = store_path;
    }
    config.validate()?;
    Ok(config)
}

/// `RUST_LOG` wins, then the configured level, then the built-in default.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_tracing(log_level: &str, json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(log_level));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(config: RegistryConfig) -> anyhow::Result<()> {
    info!("WarpReg daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = warpreg_state::open_store(&config.store)
        .with_context(|| format!("opening store at {}", config.store.path.display()))?;
    info!(backend = ?config.store.backend, path = ?config.store.path, "worker store opened");

    let prober = Arc::new(HttpProber::from_config(&config));
    let retry = RetryPolicy::from_config(&config);
    let metrics = Arc::new(RegistryMetrics::new());

    let registry = Registry::open(store, prober, retry)
        .context("hydrating registry from store")?
        .with_metrics(metrics);
    info!(workers = registry.len(), "registry ready");

    let interval = config.health.interval();
    registry.start_scheduler(interval);

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState::new(registry.clone(), &config.server.api_key));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    registry.stop_scheduler_and_wait().await;
    info!("WarpReg daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            // Without a signal handler the server can only be killed.
            error!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    }
}
