use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard error envelope returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "code": "STOCK_UNDERFLOW",
    "message": "Cannot post movement: product WIDGET-01 would have negative stock (current: 10, change: -15, result: -5)",
    "details": {"product_id": "550e8400-e29b-41d4-a716-446655440000", "sku": "WIDGET-01", "current_stock": 10, "requested_change": -15, "resulting_stock": -5},
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Structured details payload (e.g. underflow diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Unit of measure mismatch for product {sku}. Expected {expected}, got {got}")]
    UnitMismatch {
        sku: String,
        expected: String,
        got: String,
    },

    #[error("Cannot post movement without items")]
    EmptyMovement,

    #[error("Cannot post movement: product {sku} would have negative stock (current: {current_stock}, change: {requested_change}, result: {resulting_stock})")]
    StockUnderflow {
        product_id: Uuid,
        sku: String,
        current_stock: i32,
        requested_change: i64,
        resulting_stock: i64,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// HTTP status code for this error; the single source of truth for the
    /// error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidStateTransition(_)
            | Self::UnitMismatch { .. }
            | Self::EmptyMovement
            | Self::StockUnderflow { .. }
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code surfaced to API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::NotFound(_) => "RESOURCE_NOT_FOUND",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::UnitMismatch { .. } => "UNIT_MISMATCH",
            Self::EmptyMovement => "EMPTY_MOVEMENT",
            Self::StockUnderflow { .. } => "STOCK_UNDERFLOW",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::EventError(_) => "EVENT_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured payload for diagnostic display, where the error carries one
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::StockUnderflow {
                product_id,
                sku,
                current_stock,
                requested_change,
                resulting_stock,
            } => Some(json!({
                "product_id": product_id,
                "sku": sku,
                "current_stock": current_stock,
                "requested_change": requested_change,
                "resulting_stock": resulting_stock,
            })),
            Self::UnitMismatch {
                sku,
                expected,
                got,
            } => Some(json!({
                "sku": sku,
                "expected": expected,
                "got": got,
            })),
            _ => None,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// Normalizes string-ish database errors into `DbErr`, mirroring the common
/// `map_err(ServiceError::db_error)` call sites.
pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl ServiceError {
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }
}
