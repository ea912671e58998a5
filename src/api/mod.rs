//! HTTP API.
//!
//! Serves cached `GameDecisions`, on-demand simulation runs, parlay
//! generation, and admin grading. All responses are structured JSON;
//! blocked markets are served with their blocked state, never a 5xx.

pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

use std::sync::Arc;
use tracing::info;

use crate::error::Result;

pub use routes::create_router;
pub use state::AppState;

/// Bind and serve the API until the process shuts down.
pub async fn start_api_server(state: AppState, port: u16) -> Result<()> {
    let router = create_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .await
        .map_err(|e| crate::error::EngineError::Internal(format!("api server: {}", e)))?;
    Ok(())
}

/// Spawn the API server as a background task.
pub fn start_api_server_background(state: AppState, port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = start_api_server(state, port).await {
            tracing::error!("API server exited: {}", err);
        }
    })
}

/// Convenience constructor wiring the shared services into handler state.
#[allow(clippy::too_many_arguments)]
pub fn app_state(
    store: Arc<dyn crate::store::Store>,
    config: Arc<crate::config::AppConfig>,
    machine: Arc<crate::signals::SignalMachine>,
    parlay: Arc<crate::parlay::ParlayConstructor>,
    settlement: Arc<crate::settlement::SettlementEngine>,
    flags: Arc<crate::flags::FeatureFlags>,
    metrics: Arc<crate::metrics::EngineMetrics>,
) -> AppState {
    AppState {
        store,
        config,
        machine,
        parlay,
        settlement,
        flags,
        metrics,
    }
}
