use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /api/v1/authorizations` request body.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    pub authorization_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// `POST /api/v1/captures` request body.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRequest {
    pub authorization_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureResponse {
    pub capture_id: String,
    pub authorization_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub captured_at: DateTime<Utc>,
}

/// `POST /api/v1/voids` request body.
#[derive(Debug, Clone, Serialize)]
pub struct VoidRequest {
    pub authorization_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoidResponse {
    pub void_id: String,
    pub authorization_id: String,
    pub status: String,
    pub voided_at: DateTime<Utc>,
}

/// `POST /api/v1/refunds` request body.
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub capture_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub capture_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub refunded_at: DateTime<Utc>,
}

/// `GET /api/v1/authorizations/{id}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationStatusResponse {
    pub authorization_id: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

/// The bank's error body shape: `{ "error": "...", "message": "..." }`.
#[derive(Debug, Clone, Deserialize)]
pub struct BankErrorBody {
    pub error: String,
    pub message: String,
}
