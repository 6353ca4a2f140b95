use crate::bank::types::AuthorizeRequest as BankAuthorizeRequest;
use crate::core::error::{AppError, AppResult};
use crate::domain::Payment;

use super::pipeline::{Orchestrator, Probe};

/// Inbound fields for `POST /authorize`. Ingress owns format validation
/// (digit counts, date ranges); the orchestrator only enforces the
/// business invariants the state machine cares about.
pub struct AuthorizeCommand {
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
}

impl Orchestrator {
    pub async fn authorize(&self, idempotency_key: &str, cmd: AuthorizeCommand) -> AppResult<Payment> {
        let request_hash = Self::request_hash(&[
            &cmd.order_id,
            &cmd.customer_id,
            &cmd.amount_cents.to_string(),
            &cmd.currency,
            &cmd.card_number,
        ]);

        if let Probe::CacheHit(payment) = self.probe(idempotency_key, &request_hash).await? {
            return Ok(payment);
        }

        // Step B: a fresh payment always starts PENDING; there is no
        // precondition to fail against.
        let payment = Payment::new(
            cmd.order_id.clone(),
            cmd.customer_id.clone(),
            cmd.amount_cents,
            cmd.currency.clone(),
        )?;

        let mut tx = self.db.begin().await?;
        self.payments.create_payment(&mut tx, &payment).await?;
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

        // Step C.
        let bank_req = BankAuthorizeRequest {
            order_id: cmd.order_id,
            amount: cmd.amount_cents,
            currency: cmd.currency,
            card_number: cmd.card_number,
            cvv: cmd.cvv,
            expiry_month: cmd.expiry_month,
            expiry_year: cmd.expiry_year,
        };

        match self.bank.authorize(bank_req, idempotency_key).await {
            Ok(resp) => {
                self.finalize_success(idempotency_key, payment, |p| {
                    p.authorize(resp.authorization_id, resp.created_at, resp.expires_at)
                })
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
