use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Insufficient stock for Linen Weave: 2 remaining",
    "code": "INSUFFICIENT_STOCK",
    "timestamp": "2025-11-03T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Unauthorized")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payment signature verification failed")]
    SignatureInvalid,

    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    #[error("Price mismatch: {0}")]
    PriceMismatch(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("Invalid address: {0}")]
    AddressInvalid(String),

    #[error("Payment gateway error ({status}): {message}")]
    UpstreamGateway { status: u16, message: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) | Self::VariantNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::AmountMismatch(_)
            | Self::PriceMismatch(_)
            | Self::AddressInvalid(_)
            | Self::InvalidOperation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code persisted on failed payment intents and
    /// returned in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_MISMATCH",
            Self::AmountMismatch(_) => "AMOUNT_MISMATCH",
            Self::PriceMismatch(_) => "PRICE_MISMATCH",
            Self::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Self::VariantNotFound(_) => "VARIANT_NOT_FOUND",
            Self::AddressInvalid(_) => "ADDRESS_INVALID",
            Self::UpstreamGateway { .. } => "UPSTREAM_GATEWAY",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) | Self::BadRequest(_) => "INVALID_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => "INTERNAL",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.response_message(),
            code: Some(self.code().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
