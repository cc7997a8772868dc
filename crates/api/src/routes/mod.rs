pub mod checkout;
pub mod health;
pub mod locks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /admin/locks/stats                               aggregate lock counts (GET)
/// /admin/locks/detailed-stats                      every lock with timings (GET)
/// /admin/locks/release/{order_id}                  force release an order (POST)
/// /admin/locks/cleanup                             run one sweep now (POST)
/// /admin/locks/clear-all                           drop every lock (POST)
/// /admin/locks/items/{item_id}                     locks for an item (GET, ?vendor_id)
///
/// /checkout/sessions                               open a session (POST)
/// /checkout/sessions/{session_id}                  abandon a session (DELETE)
/// /checkout/verify                                 verify payment (POST)
/// /checkout/availability/{vendor_id}/{item_id}     item availability (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Lock administration: stats, remediation, cleanup.
        .nest("/admin/locks", locks::router())
        // Guest checkout flow.
        .nest("/checkout", checkout::router())
}
