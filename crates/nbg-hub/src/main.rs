//! nbgate hub daemon
//!
//! Serves the login gate and session API on loopback behind the edge proxy
//! and runs the idle reclaimer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nbg_core::config::{self, HubConfig};
use nbg_core::signing_key;
use nbg_core::traits::{CredentialVerifier, RuntimeSpawner};
use nbg_hub::auth::LocalAccountVerifier;
use nbg_hub::server::HubServer;
use nbg_hub::session::IdleReclaimer;
use nbg_hub::spawner::ProcessSpawner;
use nbg_hub::HubState;

#[derive(Parser)]
#[command(name = "nbg-hub")]
#[command(about = "nbgate hub daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("nbgate hub starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        } else {
            tracing::info!("Using default configuration");
            HubConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Access mode: {} ({} admin(s))",
        config.access.mode_name(),
        config.access.admin_users.len()
    );

    // A missing key is generated; an unreadable or corrupt one is fatal.
    let key = signing_key::load_or_generate(&config.signing_key_path)
        .context("Failed to load session signing key")?;
    tracing::info!("Signing key fingerprint: {}", key.fingerprint());

    let verifier: Arc<dyn CredentialVerifier> =
        Arc::new(LocalAccountVerifier::new(config.accounts.clone()));
    let spawner = Arc::new(ProcessSpawner::new(config.spawner.clone()));

    let bind_addr = config.bind_address.clone();
    let state = Arc::new(HubState::new(
        config,
        &key,
        verifier,
        Arc::clone(&spawner) as Arc<dyn RuntimeSpawner>,
    )?);
    drop(key);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    // Idle reclaimer
    let reclaimer_task = if state.config.idle.enabled {
        let reclaimer = IdleReclaimer::new(
            Arc::clone(&state.sessions),
            Arc::clone(&state.spawner),
            state.config.idle.clone(),
        );
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { reclaimer.run(cancel).await }))
    } else {
        tracing::warn!("Idle reclaimer disabled - runtimes are only stopped on logout");
        None
    };

    let server = HubServer::new(Arc::clone(&state), cancel.clone());
    let result = server.run(&bind_addr).await;

    // Make sure background tasks stop even if the server failed to start.
    cancel.cancel();
    if let Some(task) = reclaimer_task {
        if let Err(e) = task.await {
            tracing::warn!("Idle reclaimer task failed: {}", e);
        }
    }
    spawner.terminate_all().await;

    result?;
    tracing::info!("Hub shutdown complete");
    Ok(())
}
