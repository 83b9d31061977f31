//! Router assembly, server lifecycle, and background tasks.

use axum::routing::{get, Router};
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::routes::{create_session, delete_session, get_history, get_session, list_sessions};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Build the full router: control plane, data plane, CORS, request traces.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/history", get(get_history))
        .route("/chat/:id", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
///
/// # Errors
///
/// Returns [`GatewayError::Bind`] when the address cannot be bound (exit
/// code 2 territory) and [`GatewayError::Serve`] for failures after
/// startup.
pub async fn run(state: AppState, host: &str, port: u16) -> GatewayResult<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Bind {
            addr: addr.clone(),
            source: e,
        })?;

    info!(addr = %addr, "carapace gateway listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()))
}

/// Spawn the hourly retention sweep.
///
/// Sessions idle longer than `sessions.history_retention_days` are
/// deleted; in-flight work on a swept session observes cancellation.
#[must_use]
pub fn spawn_retention_sweep(state: AppState) -> JoinHandle<()> {
    let retention_days = i64::from(state.config.sessions.history_retention_days);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            ticker.tick().await;
            let removed = state.sessions.sweep(ChronoDuration::days(retention_days));
            if !removed.is_empty() {
                info!(count = removed.len(), "retention sweep removed sessions");
            }
        }
    })
}
