use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
    active_locks: usize,
    pending_checkouts: usize,
}

async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let now = state.locks.now();
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (now - state.started_at).num_seconds(),
        active_locks: state.locks.lock_count()?,
        pending_checkouts: state.pending.len()?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
