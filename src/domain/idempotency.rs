use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Durable registry entry enforcing at-most-once per idempotency key (C3).
/// `locked_at` present means the operation is in flight; `response_payload`
/// present means it finished (success or permanent failure) and the record
/// is immutable from that point on (invariant 6).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub payment_id: Uuid,
    pub request_hash: String,
    pub locked_at: Option<DateTime<Utc>>,
    pub response_payload: Option<Vec<u8>>,
    pub status_code: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.response_payload.is_some()
    }

    pub fn lock_age(&self) -> Option<chrono::Duration> {
        self.locked_at.map(|t| Utc::now() - t)
    }
}
