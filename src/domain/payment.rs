use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::domain::categorizer::ErrorCategory;

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(16)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Capturing,
    Captured,
    Voiding,
    Voided,
    Refunding,
    Refunded,
    Failed,
    Expired,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Capturing => "CAPTURING",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Voiding => "VOIDING",
            PaymentStatus::Voided => "VOIDED",
            PaymentStatus::Refunding => "REFUNDING",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

impl PaymentStatus {
    /// The set of statuses a transition to `self` is legal from. An empty
    /// set means the target is never reached via `transition_to` (it has
    /// its own allowed set defined elsewhere, or is unreachable by design).
    fn allowed_sources(self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Authorized => &[Pending],
            Capturing => &[Authorized],
            Captured => &[Capturing],
            Voiding => &[Authorized],
            Voided => &[Voiding],
            Refunding => &[Captured],
            Refunded => &[Refunding],
            Failed => &[Pending, Authorized, Capturing, Voiding, Refunding],
            Expired => &[Authorized],
            Pending => &[],
        }
    }

    /// Terminal states admit no outbound transitions except
    /// `CAPTURED -> REFUNDING` (invariant 4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured
                | PaymentStatus::Voided
                | PaymentStatus::Refunded
                | PaymentStatus::Failed
                | PaymentStatus::Expired
        )
    }
}

/// In-memory entity enforcing the state machine and field invariants (C1).
/// Reconstituted from the store per operation, mutated under a row lock,
/// then discarded — the Payment Store (`crate::store::payment_store`) owns
/// the durable representation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,

    pub bank_auth_id: Option<String>,
    pub bank_capture_id: Option<String>,
    pub bank_void_id: Option<String>,
    pub bank_refund_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,

    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error_category: Option<ErrorCategory>,
}

impl Payment {
    /// Create a new payment in `PENDING`. Invariant 5: `amount_cents > 0`
    /// and never mutates afterward.
    pub fn new(
        order_id: String,
        customer_id: String,
        amount_cents: i64,
        currency: String,
    ) -> Result<Self, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::validation("amount_cents must be positive"));
        }
        if order_id.trim().is_empty() {
            return Err(AppError::validation("order_id must not be empty"));
        }
        if customer_id.trim().is_empty() {
            return Err(AppError::validation("customer_id must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            customer_id,
            amount_cents,
            currency,
            status: PaymentStatus::Pending,
            bank_auth_id: None,
            bank_capture_id: None,
            bank_void_id: None,
            bank_refund_id: None,
            created_at: now,
            updated_at: now,
            authorized_at: None,
            captured_at: None,
            voided_at: None,
            refunded_at: None,
            expires_at: None,
            attempt_count: 0,
            next_retry_at: None,
            last_error_category: None,
        })
    }

    fn transition_to(&mut self, target: PaymentStatus) -> Result<(), AppError> {
        if !target.allowed_sources().contains(&self.status) {
            return Err(AppError::InvalidTransition(format!(
                "cannot move payment {} from {} to {}",
                self.id, self.status, target
            )));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn authorize(
        &mut self,
        auth_id: String,
        authorized_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Authorized)?;
        self.bank_auth_id = Some(auth_id);
        self.authorized_at = Some(authorized_at);
        self.expires_at = Some(expires_at);
        Ok(())
    }

    pub fn mark_capturing(&mut self) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Capturing)
    }

    pub fn capture(
        &mut self,
        capture_id: String,
        captured_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Captured)?;
        self.bank_capture_id = Some(capture_id);
        self.captured_at = Some(captured_at);
        Ok(())
    }

    pub fn mark_voiding(&mut self) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Voiding)
    }

    pub fn void(&mut self, void_id: String, voided_at: DateTime<Utc>) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Voided)?;
        self.bank_void_id = Some(void_id);
        self.voided_at = Some(voided_at);
        Ok(())
    }

    pub fn mark_refunding(&mut self) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Refunding)
    }

    pub fn refund(
        &mut self,
        refund_id: String,
        refunded_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Refunded)?;
        self.bank_refund_id = Some(refund_id);
        self.refunded_at = Some(refunded_at);
        Ok(())
    }

    pub fn fail(&mut self, category: Option<ErrorCategory>) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Failed)?;
        self.last_error_category = category;
        Ok(())
    }

    pub fn mark_expired(&mut self) -> Result<(), AppError> {
        self.transition_to(PaymentStatus::Expired)
    }

    /// Does not change status; increments `attempt_count`, stamps
    /// `next_retry_at` and records the category that triggered the retry.
    pub fn schedule_retry(&mut self, backoff: chrono::Duration, category: ErrorCategory) {
        self.attempt_count += 1;
        self.next_retry_at = Some(Utc::now() + backoff);
        self.last_error_category = Some(category);
        self.updated_at = Utc::now();
    }
}
