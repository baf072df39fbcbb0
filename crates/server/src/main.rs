//! Translation relay server entry point: load configuration, wire up
//! `AppState` against the configured store/transport backends, and serve
//! the call-stream WebSocket alongside health/readiness/metrics.

use std::net::SocketAddr;

use relay_config::{load_settings, Settings};
use relay_server::{create_router, init_metrics, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("RELAY_CONFIG_PATH").ok();
    let config = match load_settings(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("warning: failed to load config ({e}); using defaults");
            Settings::default()
        }
    };

    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting translation relay server");

    init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let state = match AppState::connect(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect configured backends, falling back to in-memory");
            AppState::in_memory(config.clone())
        }
    };

    let app = create_router(state);

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "relay_server=info,tower_http=info".into());

    let json_logs = std::env::var("RELAY_LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
