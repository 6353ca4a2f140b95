use uuid::Uuid;

use crate::bank::types::RefundRequest as BankRefundRequest;
use crate::core::error::{AppError, AppResult};
use crate::domain::{Payment, PaymentStatus};

use super::pipeline::{Orchestrator, Probe};

pub struct RefundCommand {
    pub payment_id: Uuid,
    pub amount_cents: i64,
}

impl Orchestrator {
    pub async fn refund(&self, idempotency_key: &str, cmd: RefundCommand) -> AppResult<Payment> {
        let request_hash = Self::request_hash(&[&cmd.payment_id.to_string(), &cmd.amount_cents.to_string()]);

        if let Probe::CacheHit(payment) = self.probe(idempotency_key, &request_hash).await? {
            return Ok(payment);
        }

        let mut tx = self.db.begin().await?;
        let Some(mut payment) = self.payments.find_by_id_for_update(&mut tx, cmd.payment_id).await? else {
            tx.rollback().await?;
            return Err(AppError::not_found(format!("payment {} not found", cmd.payment_id)));
        };

        if payment.status != PaymentStatus::Captured {
            tx.rollback().await?;
            return Err(AppError::InvalidTransition(format!(
                "cannot refund payment {} in status {}",
                payment.id, payment.status
            )));
        }
        if payment.bank_capture_id.is_none() {
            tx.rollback().await?;
            return Err(AppError::Precondition(format!(
                "payment {} has no bank_capture_id to refund against",
                payment.id
            )));
        }
        if cmd.amount_cents != payment.amount_cents {
            tx.rollback().await?;
            return Err(AppError::AmountMismatch {
                expected: payment.amount_cents,
                actual: cmd.amount_cents,
            });
        }

        payment.mark_refunding()?;
        self.payments.update_payment(&mut tx, &payment).await?;

        if let Err(e) = self
            .idempotency
            .acquire_lock(&mut tx, idempotency_key, payment.id, &request_hash)
            .await
        {
            tx.rollback().await?;
            if matches!(e, AppError::DuplicateIdempotencyKey) {
                return self.wait_for_completion(idempotency_key, &request_hash).await;
            }
            return Err(e);
        }
        tx.commit().await?;

        let bank_req = BankRefundRequest {
            capture_id: payment.bank_capture_id.clone().expect("checked above"),
            amount: cmd.amount_cents,
        };

        match self.bank.refund(bank_req, idempotency_key).await {
            Ok(resp) => {
                self.finalize_success(idempotency_key, payment, |p| p.refund(resp.refund_id, resp.refunded_at))
                    .await
            }
            Err(failure) => {
                let (category, err) = Orchestrator::categorize_bank_failure(failure);
                if category.is_retryable() {
                    Err(self.transient_failure(payment.id, category, err))
                } else {
                    self.finalize_permanent_failure(idempotency_key, payment, category, err).await
                }
            }
        }
    }
}
