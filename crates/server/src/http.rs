//! HTTP/WebSocket router: the call stream upgrade plus health, readiness
//! and Prometheus endpoints. Call setup (creating rooms, issuing tokens)
//! lives outside this service.

use axum::{
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;

pub fn create_router(state: AppState) -> Router {
    let (stream_endpoint, cors_origins, cors_enabled) = {
        let config = state.config.read();
        (
            config.server.stream_endpoint.clone(),
            config.server.cors_origins.clone(),
            config.server.cors_enabled,
        )
    };
    let cors_layer = build_cors_layer(&cors_origins, cors_enabled);
    let ws_route = format!("{stream_endpoint}/:session_id");

    Router::new()
        .route(&ws_route, get(ws_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins.
///
/// - If `cors_enabled` is false, returns a permissive layer (dev only).
/// - If `cors_origins` is empty or entirely unparseable, falls back to
///   `http://localhost:3000` rather than silently allowing nothing.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled — allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::info!("no valid CORS origins configured, defaulting to http://localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!(count = parsed.len(), "CORS configured with explicit origins");
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "active_sessions": state.sessions.count(),
        "active_calls": state.active_calls.len(),
    }))
}
