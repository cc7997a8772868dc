//! Shared response envelope types for API handlers.
//!
//! All successful API responses use a `{ "success": true, "data": ...,
//! "timestamp": ... }` envelope. Use [`ApiResponse::ok`] instead of ad-hoc
//! `serde_json::json!` bodies to get compile-time type safety and consistent
//! serialization.

use bites_core::types::Timestamp;
use serde::Serialize;

/// Standard success envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(ApiResponse::ok(stats)))
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: Timestamp,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now(),
        }
    }
}
