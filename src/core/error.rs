use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Closed error taxonomy surfaced by the orchestrator, query service and
/// HTTP ingress. Every variant maps to exactly one HTTP status and one
/// machine-readable code (see `code`).
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Bad input at ingress (request body failed validation).
    #[error("validation error: {0}")]
    Validation(String),

    /// Same idempotency key reused with a different request body.
    #[error("idempotency key reused with a different request")]
    IdempotencyMismatch,

    /// Another in-flight request already holds this idempotency key.
    #[error("idempotency key is already in flight")]
    DuplicateIdempotencyKey,

    /// Wait-for-completion loop gave up before the holder finished.
    #[error("request is still processing, retry with the same key")]
    RequestProcessing,

    /// Operation is not legal for the payment's current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Payment (or idempotency key) not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Capture/refund amount does not equal the payment's authorized amount.
    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    /// Precondition failed (e.g. refund attempted before a capture exists).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The bank rejected the request or returned a transport-level error.
    #[error("bank gateway error: {0}")]
    Gateway(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Uncategorized infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::Gateway(msg.into())
    }

    /// Machine-readable error code returned in the HTTP envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::IdempotencyMismatch => "IDEMPOTENCY_MISMATCH",
            AppError::DuplicateIdempotencyKey => "DUPLICATE_IDEMPOTENCY_KEY",
            AppError::RequestProcessing => "REQUEST_PROCESSING",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::NotFound(_) => "PAYMENT_NOT_FOUND",
            AppError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            AppError::Precondition(_) => "INVALID_STATE",
            AppError::Gateway(_) => "GATEWAY_ERROR",
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::Configuration(_) => "INTERNAL_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::IdempotencyMismatch => StatusCode::BAD_REQUEST,
            AppError::DuplicateIdempotencyKey => StatusCode::CONFLICT,
            AppError::RequestProcessing => StatusCode::ACCEPTED,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AmountMismatch { .. } => StatusCode::CONFLICT,
            AppError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Sanitize 5xx messages; 4xx describe a problem with the caller's
        // own request and are safe to return verbatim.
        let message = match self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error occurred");
                "a database error occurred".to_string()
            }
            AppError::Configuration(e) => {
                tracing::error!(error = %e, "configuration error occurred");
                "a configuration error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error occurred");
                "an internal error occurred".to_string()
            }
            AppError::Gateway(e) => {
                tracing::error!(error = %e, "bank gateway error occurred");
                "a payment gateway error occurred".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
            }
        }))
    }
}
