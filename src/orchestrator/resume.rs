use chrono::Duration;
use rand::Rng;
use sqlx::{MySql, Transaction};

use crate::bank::types::{CaptureRequest as BankCaptureRequest, RefundRequest as BankRefundRequest, VoidRequest as BankVoidRequest};
use crate::core::error::AppResult;
use crate::domain::Payment;
use crate::domain::PaymentStatus;

use super::pipeline::Orchestrator;

/// Re-issues Step C + Step D for a payment the reconciler found stuck in an
/// intermediate state. Step A/B already ran (and committed) in a prior
/// pipeline invocation; the idempotency lock is still held under `key`.
///
/// `tx` is the same transaction the caller used to claim the row with
/// `FOR UPDATE SKIP LOCKED` — it stays open across Step C's bank call and
/// is committed only once, after Step D's finalization decision, so a
/// second reconciler tick can never pick up the same row mid-attempt.
impl Orchestrator {
    pub async fn resume_stuck(
        &self,
        tx: &mut Transaction<'_, MySql>,
        mut payment: Payment,
        idempotency_key: &str,
        max_retries: i32,
        max_backoff_minutes: i64,
    ) -> AppResult<Payment> {
        let outcome = match payment.status {
            PaymentStatus::Capturing => {
                let bank_req = BankCaptureRequest {
                    authorization_id: payment.bank_auth_id.clone().unwrap_or_default(),
                    amount: payment.amount_cents,
                };
                self.bank
                    .capture(bank_req, idempotency_key)
                    .await
                    .map(|resp| (resp.capture_id, resp.captured_at))
            }
            PaymentStatus::Voiding => {
                let bank_req = BankVoidRequest {
                    authorization_id: payment.bank_auth_id.clone().unwrap_or_default(),
                };
                self.bank
                    .void(bank_req, idempotency_key)
                    .await
                    .map(|resp| (resp.void_id, resp.voided_at))
            }
            PaymentStatus::Refunding => {
                let bank_req = BankRefundRequest {
                    capture_id: payment.bank_capture_id.clone().unwrap_or_default(),
                    amount: payment.amount_cents,
                };
                self.bank
                    .refund(bank_req, idempotency_key)
                    .await
                    .map(|resp| (resp.refund_id, resp.refunded_at))
            }
            other => {
                return Err(crate::core::error::AppError::Internal(format!(
                    "resume_stuck called for payment {} in non-intermediate status {}",
                    payment.id, other
                )))
            }
        };

        match outcome {
            Ok((reference_id, at)) => {
                let status = payment.status;
                self.finalize_success_in_tx(tx, idempotency_key, payment, |p| match status {
                    PaymentStatus::Capturing => p.capture(reference_id, at),
                    PaymentStatus::Voiding => p.void(reference_id, at),
                    PaymentStatus::Refunding => p.refund(reference_id, at),
                    _ => unreachable!(),
                })
                .await
            }
            Err(failure) => {
                let (category, err) = Orchestrator::categorize_bank_failure(failure);
                if !category.is_retryable() {
                    return self.finalize_permanent_failure_in_tx(tx, idempotency_key, payment, category, err).await;
                }

                if payment.attempt_count + 1 >= max_retries {
                    payment.fail(Some(category))?;
                    self.payments.update_payment(tx, &payment).await?;
                    self.idempotency
                        .store_response(tx, idempotency_key, b"{\"outcome\":\"failed\",\"reason\":\"max_retries\"}", 500)
                        .await?;
                    self.idempotency.release_lock(tx, idempotency_key).await?;
                    return Err(err);
                }

                let backoff_minutes = 2i64.saturating_pow(payment.attempt_count as u32).min(max_backoff_minutes);
                let jitter_ms: i64 = rand::thread_rng().gen_range(0..1000);
                let backoff = Duration::minutes(backoff_minutes) + Duration::milliseconds(jitter_ms);

                payment.schedule_retry(backoff, category);
                self.payments.update_payment(tx, &payment).await?;

                Err(err)
            }
        }
    }
}
