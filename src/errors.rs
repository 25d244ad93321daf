use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned to API clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "message": "Insufficient stock: requested 20, available 15",
    "details": null,
    "timestamp": "2026-01-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional machine-readable detail (shortfall figures, reconciliation flags)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Service-level error taxonomy.
///
/// Every failure a stock operation can surface is classified here; handlers
/// map each variant onto an HTTP status and an [`ErrorResponse`] body.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The allocator could not cover the requested quantity. Recoverable by
    /// the caller; no mutation has been attempted when this is returned.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    /// A conditional quantity write found the row changed (or gone) since it
    /// was read. Inside an operation this becomes a step failure.
    #[error("Concurrent modification of batch {0}")]
    ConcurrentModification(Uuid),

    /// A store read/write failed mid-operation. Compensating rollback has
    /// already run over everything applied before the failing step.
    #[error("Operation failed and was rolled back: {0}")]
    StepFailure(String),

    /// The sale ledger write failed after stock was durably deducted. Stock
    /// and ledger state have diverged; flagged for manual reconciliation.
    #[error("Terminal inconsistency: {0}")]
    TerminalInconsistency(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    fn status_and_label(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            ServiceError::AuthError(_) | ServiceError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ServiceError::InsufficientStock { .. } => (StatusCode::CONFLICT, "Conflict"),
            ServiceError::ConcurrentModification(_) => (StatusCode::CONFLICT, "Conflict"),
            ServiceError::TerminalInconsistency(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Terminal Inconsistency")
            }
            ServiceError::StepFailure(_)
            | ServiceError::DatabaseError(_)
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::InsufficientStock {
                requested,
                available,
            } => Some(json!({
                "requested": requested,
                "available": available,
                "shortfall": requested - available,
            })),
            ServiceError::TerminalInconsistency(_) => Some(json!({
                "code": "terminal_inconsistency",
                "requires_reconciliation": true,
            })),
            ServiceError::ConcurrentModification(batch_id) => Some(json!({
                "batch_id": batch_id,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, label) = self.status_and_label();

        // Internal failures keep their detail out of the response body.
        let message = match &self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: label.to_string(),
            message,
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
