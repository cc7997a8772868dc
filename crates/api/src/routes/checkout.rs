//! Route definitions for the checkout flow.
//!
//! Mounted at `/checkout` by `api_routes()`.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::checkout;
use crate::state::AppState;

/// Checkout routes.
///
/// ```text
/// POST   /sessions                              -> open_session
/// DELETE /sessions/{session_id}                 -> abandon_session
/// POST   /verify                                -> verify_payment
/// GET    /availability/{vendor_id}/{item_id}    -> item_availability
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(checkout::open_session))
        .route("/sessions/{session_id}", delete(checkout::abandon_session))
        .route("/verify", post(checkout::verify_payment))
        .route(
            "/availability/{vendor_id}/{item_id}",
            get(checkout::item_availability),
        )
}
