//! Route definitions for lock administration.
//!
//! Mounted at `/admin/locks` by `api_routes()`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Lock admin routes.
///
/// ```text
/// GET    /stats                 -> get_lock_stats
/// GET    /detailed-stats        -> get_detailed_stats
/// POST   /release/{order_id}    -> force_release_order_locks
/// POST   /cleanup               -> cleanup_expired_orders
/// POST   /clear-all             -> clear_all_locks
/// GET    /items/{item_id}       -> get_locks_for_item (?vendor_id)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(locks::get_lock_stats))
        .route("/detailed-stats", get(locks::get_detailed_stats))
        .route(
            "/release/{order_id}",
            post(locks::force_release_order_locks),
        )
        .route("/cleanup", post(locks::cleanup_expired_orders))
        .route("/clear-all", post(locks::clear_all_locks))
        .route("/items/{item_id}", get(locks::get_locks_for_item))
}
