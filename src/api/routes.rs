use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::{handlers, state::AppState};

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = configured
        .iter()
        .filter_map(|v| HeaderValue::from_str(v.trim()).ok())
        .collect();

    if origins.is_empty() {
        origins.push(HeaderValue::from_static("http://localhost:5173"));
        origins.push(HeaderValue::from_static("http://127.0.0.1:5173"));
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.api.cors_origins);

    Router::new()
        // readiness probes
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // decision surface
        .route(
            "/api/games/:league/:event_id/decisions",
            get(handlers::get_game_decisions),
        )
        .route("/api/simulations/run", post(handlers::run_simulation))
        // parlay surface
        .route("/api/parlay/generate", post(handlers::generate_parlay))
        .route("/api/parlay/stats", get(handlers::parlay_stats))
        // admin surface
        .route("/api/grading/pick/:pick_id", post(handlers::grade_pick))
        .with_state(state)
        .layer(cors)
}
