use uuid::Uuid;

use crate::bank::types::VoidRequest as BankVoidRequest;
use crate::core::error::{AppError, AppResult};
use crate::domain::{Payment, PaymentStatus};

use super::pipeline::{Orchestrator, Probe};

pub struct VoidCommand {
    pub payment_id: Uuid,
}

impl Orchestrator {
    pub async fn void(&self, idempotency_key: &str, cmd: VoidCommand) -> AppResult<Payment> {
        let request_hash = Self::request_hash(&[&cmd.payment_id.to_string()]);

        if let Probe::CacheHit(payment) = self.probe(idempotency_key, &request_hash).await? {
            return Ok(payment);
        }

        let mut tx = self.db.begin().await?;
        let Some(mut payment) = self.payments.find_by_id_for_update(&mut tx, cmd.payment_id).await? else {
            tx.rollback().await?;
            return Err(AppError::not_found(format!("payment {} not found", cmd.payment_id)));
        };

        if payment.status != PaymentStatus::Authorized || payment.bank_auth_id.is_none() {
            tx.rollback().await?;
            return Err(AppError::InvalidTransition(format!(
                "cannot void payment {} in status {}",
                payment.id, payment.status
            )));
        }

        payment.mark_voiding()?;
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

        let bank_req = BankVoidRequest {
            authorization_id: payment.bank_auth_id.clone().expect("checked above"),
        };

        match self.bank.void(bank_req, idempotency_key).await {
            Ok(resp) => {
                self.finalize_success(idempotency_key, payment, |p| p.void(resp.void_id, resp.voided_at))
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
