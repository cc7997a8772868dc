//! Handlers for the `/checkout` resource.
//!
//! Thin adapters over [`CheckoutService`](bites_core::checkout::CheckoutService).
//! Lock contention comes back as 409 `ITEM_LOCKED`; retrying is up to the
//! client.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bites_core::checkout::{AbandonReport, CheckoutSession, CompletedCheckout, OpenCheckout};
use bites_core::pending::CheckoutItem;
use bites_core::types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Request body for opening a checkout session.
#[derive(Debug, Deserialize)]
pub struct OpenCheckoutRequest {
    pub vendor_id: String,
    pub items: Vec<CheckoutItem>,
    pub total: f64,
    pub collector_name: String,
    pub collector_phone: String,
    pub order_type: String,
}

impl From<OpenCheckoutRequest> for OpenCheckout {
    fn from(req: OpenCheckoutRequest) -> Self {
        OpenCheckout {
            vendor_id: req.vendor_id,
            items: req.items,
            total: req.total,
            collector_name: req.collector_name,
            collector_phone: req.collector_phone,
            order_type: req.order_type,
        }
    }
}

/// POST /api/v1/checkout/sessions
///
/// Lock the cart and open a payment session.
pub async fn open_session(
    State(state): State<AppState>,
    Json(body): Json<OpenCheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutSession>>)> {
    let session = state.checkout.open_session(body.into())?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(session))))
}

/// Request body for payment verification, as relayed from the gateway.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub session_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// POST /api/v1/checkout/verify
///
/// Verify the gateway signature and record the order.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(body): Json<VerifyPaymentRequest>,
) -> AppResult<Json<ApiResponse<CompletedCheckout>>> {
    if body.session_id.trim().is_empty() || body.payment_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "session_id and payment_id are required".to_string(),
        ));
    }
    let completed = state
        .checkout
        .verify_payment(&body.session_id, &body.payment_id, &body.signature)
        .await?;
    Ok(Json(ApiResponse::ok(completed)))
}

/// DELETE /api/v1/checkout/sessions/{session_id}
///
/// Abandon a session. Idempotent.
pub async fn abandon_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<ApiResponse<AbandonReport>>> {
    let report = state.checkout.abandon(&session_id)?;
    Ok(Json(ApiResponse::ok(report)))
}

/// Public availability of one item. Holder identity is not exposed.
#[derive(Debug, Serialize)]
pub struct ItemAvailability {
    pub vendor_id: String,
    pub item_id: String,
    pub available: bool,
    pub locked_until: Option<Timestamp>,
}

/// GET /api/v1/checkout/availability/{vendor_id}/{item_id}
pub async fn item_availability(
    State(state): State<AppState>,
    Path((vendor_id, item_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<ItemAvailability>>> {
    let lock = state.locks.get_lock(&vendor_id, &item_id)?;
    Ok(Json(ApiResponse::ok(ItemAvailability {
        available: lock.is_none(),
        locked_until: lock.map(|l| l.expires_at),
        vendor_id,
        item_id,
    })))
}
