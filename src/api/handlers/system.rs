use axum::{extract::State, Json};

use crate::api::state::AppState;

/// GET /health
pub async fn health_handler(State(_state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "edgeline",
    }))
}

/// GET /metrics (Prometheus text format)
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.prometheus()
}
