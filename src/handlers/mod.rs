pub mod events;
pub mod orders;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, warn};
use serde_json::json;
use std::future::Future;

use crate::config::TRANSIENT_RETRY_ATTEMPTS;
use crate::core::CoreError;

/// Maps core errors onto the wire. Business rejections keep their specific
/// code and message so a buyer sees "sold out" rather than a generic
/// failure; internal faults are logged and collapsed to a 500.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            CoreError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::SaleNotOpen => (StatusCode::CONFLICT, "sale_not_open"),
            CoreError::SoldOut => (StatusCode::CONFLICT, "sold_out"),
            CoreError::DuplicateOrder => (StatusCode::CONFLICT, "duplicate_order"),
            CoreError::InsufficientStock => (StatusCode::CONFLICT, "insufficient_stock"),
            CoreError::Consistency(_) | CoreError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if self.0.is_rejection() {
            // Expected and frequent during a drop, not a failure
            debug!("request rejected: {}", self.0);
        } else {
            error!("request failed: {}", self.0);
        }

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

/// Re-runs a core operation a bounded number of times when the store
/// reports a transient failure (deadlock, lock timeout). Rejections and
/// real faults pass straight through.
pub(crate) async fn with_retry<T, F, Fut>(op: F) -> Result<T, CoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(e) if e.retryable() && attempt < TRANSIENT_RETRY_ATTEMPTS => {
                warn!("transient database error, retrying (attempt {attempt}): {e}");
            }
            other => return other,
        }
    }
}
