//! # plugwatchd — plugwatch daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize logging
//! - Construct the plug driver and the event bus
//! - Construct and start the coordinator
//! - Build the axum router and serve it
//! - Reload the fleet section on SIGHUP
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use plugwatch_adapter_http_axum::state::AppState;
use plugwatch_adapter_virtual::VirtualPlugDriver;
use plugwatch_app::coordinator::Coordinator;
use plugwatch_app::event_bus::InProcessEventBus;
#[cfg(unix)]
use plugwatch_app::ports::PlugDriver;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DriverConfig, DriverKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(config.logging.effective_filter());
    let bind_addr = config.bind_addr();

    let driver = build_driver(&config.driver);
    let bus = Arc::new(InProcessEventBus::new(config.events.capacity));
    let coordinator = Arc::new(Coordinator::new(driver, bus, config.fleet)?);
    coordinator.start().await?;

    #[cfg(unix)]
    spawn_reload(Arc::clone(&coordinator));

    let app = plugwatch_adapter_http_axum::router::build(AppState::new(Arc::clone(&coordinator)));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "plugwatchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown();
    tracing::info!("plugwatchd stopped");
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?}: {err}, falling back to info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_driver(config: &DriverConfig) -> VirtualPlugDriver {
    match config.kind {
        DriverKind::Virtual => {
            let driver = VirtualPlugDriver::new(config.latency());
            for address in &config.unreachable {
                driver.set_unreachable(address.as_str(), true);
            }
            tracing::info!(
                latency_ms = config.latency_ms,
                unreachable = config.unreachable.len(),
                "using virtual plug driver"
            );
            driver
        }
    }
}

/// Re-read the config file on SIGHUP and apply its fleet section.
#[cfg(unix)]
fn spawn_reload<D: PlugDriver + 'static>(coordinator: Arc<Coordinator<D>>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                tracing::error!(%err, "failed to install SIGHUP handler, live reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            let config = match Config::load() {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(%err, "config reload rejected, keeping current settings");
                    continue;
                }
            };
            match coordinator.apply_settings(config.fleet).await {
                Ok(()) => tracing::info!("fleet settings reloaded"),
                Err(err) => tracing::warn!(%err, "fleet settings rejected on reload"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
