//! PtyRelay server - entry point.
//!
//! Startup order:
//! 1. Load configuration (file, then command-line overrides).
//! 2. Initialise tracing.
//! 3. Create the uploads and output directories.
//! 4. Probe the installed OCR languages.
//! 5. Start the expiry sweeper.
//! 6. Serve HTTP until SIGINT/SIGTERM, then stop the sweeper.

mod error;
mod routes;
mod state;

use anyhow::Context;
use clap::Parser;
use relay_foundation::RelayConfig;
use relay_task::{ExpirySweeper, LanguageCatalog};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

/// PtyRelay - run an OCR tool under a PTY and stream its terminal to the browser
#[derive(Parser, Debug)]
#[command(name = "ptyrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a relay.json config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding uploads, output and index.html (overrides config)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RelayConfig::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(root) = args.data_root {
        config.data_root = Some(root);
    }

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ptyrelay starting");

    for dir in [config.uploads_path(), config.output_path()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    info!(data_root = %config.resolve_data_root().display(), "Data directories ready");

    let languages = LanguageCatalog::probe(&config.languages).await;

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address))?;
    let sweep_interval = config.sweep_interval();
    let state = Arc::new(AppState::new(config, languages));

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(Arc::clone(state.tasks.registry()), sweep_interval)
        .spawn(shutdown.clone());

    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "expiry sweeper ended abnormally");
    }

    info!("ptyrelay stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
