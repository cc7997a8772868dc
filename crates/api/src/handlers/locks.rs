//! Handlers for the `/admin/locks` resource.
//!
//! Operational introspection and emergency remediation for item locks.
//! None of these are on the checkout path.

use axum::extract::{Path, Query, State};
use axum::Json;
use bites_core::lock::stats::{ClearReport, DetailedLockStats, ForceReleaseReport, LockStatistics};
use bites_core::lock::Lock;
use bites_core::sweeper::SweepReport;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/admin/locks/stats
///
/// Aggregate lock counts.
pub async fn get_lock_stats(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<LockStatistics>>> {
    let stats = state.locks.lock_statistics()?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/v1/admin/locks/detailed-stats
///
/// Every lock with holder and timing details. For debugging only.
pub async fn get_detailed_stats(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<DetailedLockStats>>> {
    let detailed = state.locks.detailed_stats()?;
    Ok(Json(ApiResponse::ok(detailed)))
}

/// POST /api/v1/admin/locks/release/{order_id}
///
/// Release every lock held by an order, bypassing holder checks.
pub async fn force_release_order_locks(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> AppResult<Json<ApiResponse<ForceReleaseReport>>> {
    let report = state.locks.force_release_order_locks(&order_id)?;
    let dropped = state.pending.remove_by_holder(&order_id)?;
    tracing::debug!(order_id = %order_id, pending_dropped = dropped, "Admin force release");
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/v1/admin/locks/cleanup
///
/// Run one sweep cycle now instead of waiting for the scheduler.
pub async fn cleanup_expired_orders(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<SweepReport>>> {
    let report = state.sweeper.run_cycle()?;
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/v1/admin/locks/clear-all
///
/// Drop every lock. Incident recovery only.
pub async fn clear_all_locks(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ClearReport>>> {
    let report = state.locks.clear_all_locks()?;
    Ok(Json(ApiResponse::ok(report)))
}

/// Query parameters for the item lookup.
#[derive(Debug, Deserialize)]
pub struct ItemLocksQuery {
    pub vendor_id: Option<String>,
}

/// GET /api/v1/admin/locks/items/{item_id}
///
/// Locks referencing an item, across vendors unless `?vendor_id=` is given.
pub async fn get_locks_for_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(params): Query<ItemLocksQuery>,
) -> AppResult<Json<ApiResponse<Vec<Lock>>>> {
    let locks = state
        .locks
        .get_locks_for_item(&item_id, params.vendor_id.as_deref())?;
    Ok(Json(ApiResponse::ok(locks)))
}
