//! ==============================================================================
//! main.rs - sensor dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the pieces together and runs until ctrl-c / sigterm.
//!
//! responsibilities:
//!     - load configuration (config/dashboard.toml or defaults)
//!     - install the tracing subscriber
//!     - start the session (push channel + snapshot + reconciler)
//!     - serve the dashboard from the session's published views
//!     - tear the session down on shutdown
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      dashboard (this file)                    │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!     │  │ push channel │   │ snapshot     │   │ web server       │  │
//!     │  │ (socket.io)  │   │ (GET /cache) │   │ (port 3000)      │  │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────▲─────────┘  │
//!     │         │ mpsc             │ mpsc               │ watch      │
//!     │         └─────────┬────────┘                    │            │
//!     │             ┌─────┴──────┐                      │            │
//!     │             │  session   │──────────────────────┘            │
//!     │             │ reconciler │   <- session.rs, reconciler.rs    │
//!     │             └────────────┘                                   │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::Result;
use sensor_dashboard::{config::DashboardConfig, logging, server, session};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let (config, source) = DashboardConfig::load_or_default();

    // step 2: logging, so everything after this goes through tracing
    logging::init_tracing(&config.logging.level);

    info!("===========================================================");
    info!("  Temperature Monitoring Dashboard");
    info!("===========================================================");
    match source {
        Ok(path) => info!("[CONFIG] Loaded from {}", path.display()),
        Err(reason) => warn!("[CONFIG] {}", reason),
    }
    config.print_summary();

    // step 3: start the session
    let handle = session::spawn(config.session_config()?)?;

    // step 4: serve the dashboard until a shutdown signal
    let state = server::AppState::new(handle.subscribe(), config.server.refresh_seconds);
    let served = server::run_server(&config.server.bind, state, shutdown_signal()).await;

    // step 5: teardown
    info!("shutting down");
    handle.shutdown().await;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "sigterm handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
