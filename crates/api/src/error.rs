use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bites_core::error::CoreError;
use bites_core::lock::LockError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `bites_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<LockError> for AppError {
    fn from(err: LockError) -> Self {
        AppError::Core(CoreError::Lock(err))
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
                CoreError::Lock(lock) => classify_lock_error(lock),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "success": false,
            "error": message,
            "code": code,
            "timestamp": chrono::Utc::now(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a lock error into an HTTP status, error code, and message.
///
/// - Contention (`ItemLocked`) maps to 409 with a retry hint.
/// - `NotHolder` maps to 409.
/// - Malformed lock requests map to 400.
/// - A failed store maps to 500 and keeps its message for operators.
fn classify_lock_error(err: &LockError) -> (StatusCode, &'static str, String) {
    match err {
        LockError::ItemLocked { item_id, .. } => (
            StatusCode::CONFLICT,
            "ITEM_LOCKED",
            format!(
                "Item {item_id} is currently being ordered by someone else, please try again shortly"
            ),
        ),
        LockError::NotHolder { .. } => (StatusCode::CONFLICT, "NOT_HOLDER", err.to_string()),
        LockError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        LockError::StoreUnavailable(_) => {
            tracing::error!(error = %err, "Lock store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_UNAVAILABLE",
                err.to_string(),
            )
        }
    }
}
