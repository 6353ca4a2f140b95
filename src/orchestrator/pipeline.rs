use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use sqlx::{MySql, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use actix_web::error::ResponseError;

use crate::bank::BankGateway;
use crate::core::error::{AppError, AppResult};
use crate::core::tx::Db;
use crate::domain::{categorize, DomainError, ErrorCategory, Failure, Payment};
use crate::store::{IdempotencyStore, PaymentStore};

/// Poll cadence and ceiling for the wait-for-completion loop (spec-fixed,
/// not operator-tunable).
const WAIT_TICK: Duration = Duration::from_millis(100);
const WAIT_CEILING: Duration = Duration::from_secs(30);
const STALE_LOCK_AGE: chrono::Duration = chrono::Duration::minutes(5);

/// Outcome of the Step A idempotency probe.
pub(super) enum Probe {
    /// No prior record for this key — proceed to Step B.
    Proceed,
    /// The operation already completed (successfully or with a permanent
    /// failure); the payment row reflects the final state.
    CacheHit(Payment),
}

/// Shared skeleton for the four command pipelines (Authorize/Capture/Void/
/// Refund). Each operation module drives this through its own
/// precondition checks, bank call, and terminal transition; the probe,
/// wait loop, and finalization steps are identical across operations.
#[derive(Clone)]
pub struct Orchestrator {
    pub(super) db: Db,
    pub(super) payments: Arc<PaymentStore>,
    pub(super) idempotency: Arc<IdempotencyStore>,
    pub(super) bank: Arc<dyn BankGateway>,
}

impl Orchestrator {
    pub fn new(
        db: Db,
        payments: Arc<PaymentStore>,
        idempotency: Arc<IdempotencyStore>,
        bank: Arc<dyn BankGateway>,
    ) -> Self {
        Self {
            db,
            payments,
            idempotency,
            bank,
        }
    }

    /// Exposes the transaction source to the reconciler, which needs its
    /// own short-lived locked reads outside any of the four command
    /// pipelines.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Exposes the bank gateway to the reconciler's expiry job, which
    /// cross-checks a locally-expired authorization against the acquirer
    /// before finalizing it.
    pub fn bank(&self) -> &Arc<dyn BankGateway> {
        &self.bank
    }

    /// SHA-256 over the business-significant fields of a command, joined
    /// with a separator that cannot appear in any of them.
    pub(super) fn request_hash(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub(super) async fn probe(&self, key: &str, expected_hash: &str) -> AppResult<Probe> {
        let Some(record) = self.idempotency.find_key(key).await? else {
            return Ok(Probe::Proceed);
        };

        if record.request_hash != expected_hash {
            return Err(AppError::IdempotencyMismatch);
        }

        if record.is_complete() {
            let payment = self.payments.find_by_id(record.payment_id).await?.ok_or_else(|| {
                AppError::Internal(format!(
                    "idempotency key '{key}' references missing payment {}",
                    record.payment_id
                ))
            })?;
            return Ok(Probe::CacheHit(payment));
        }

        let payment = self.wait_for_completion(key, expected_hash).await?;
        Ok(Probe::CacheHit(payment))
    }

    /// Poll the idempotency record until it unlocks, goes stale, or the
    /// outer ceiling elapses. Models an external-row wait as a bounded
    /// poll, never an unbounded condition-variable wait.
    pub(super) async fn wait_for_completion(&self, key: &str, expected_hash: &str) -> AppResult<Payment> {
        let deadline = Instant::now() + WAIT_CEILING;

        loop {
            let record = self.idempotency.find_key(key).await?.ok_or_else(|| {
                AppError::Internal(format!("idempotency key '{key}' disappeared while waiting"))
            })?;

            if record.request_hash != expected_hash {
                return Err(AppError::IdempotencyMismatch);
            }

            if !record.is_locked() {
                return self.payments.find_by_id(record.payment_id).await?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "idempotency key '{key}' references missing payment {}",
                        record.payment_id
                    ))
                });
            }

            if record.lock_age().is_some_and(|age| age > STALE_LOCK_AGE) {
                return Err(AppError::RequestProcessing);
            }

            if Instant::now() >= deadline {
                return Err(AppError::RequestProcessing);
            }

            tokio::time::sleep(WAIT_TICK).await;
        }
    }

    /// Step D, success path: apply the terminal transition, persist, and
    /// close out the idempotency record. Opens and commits its own
    /// transaction — used by the four command pipelines, which hold no
    /// transaction across Step C's bank call.
    pub(super) async fn finalize_success(
        &self,
        key: &str,
        payment: Payment,
        apply: impl FnOnce(&mut Payment) -> AppResult<()>,
    ) -> AppResult<Payment> {
        let mut tx = self.db.begin().await?;
        let payment = self.finalize_success_in_tx(&mut tx, key, payment, apply).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Same as `finalize_success` but against a transaction the caller
    /// already holds open. Used by the reconciler's resume path, which
    /// must not release its row lock until this finalization decision is
    /// durable.
    pub(super) async fn finalize_success_in_tx(
        &self,
        tx: &mut Transaction<'_, MySql>,
        key: &str,
        mut payment: Payment,
        apply: impl FnOnce(&mut Payment) -> AppResult<()>,
    ) -> AppResult<Payment> {
        apply(&mut payment)?;

        self.payments.update_payment(tx, &payment).await?;
        self.idempotency
            .store_response(tx, key, b"{\"outcome\":\"success\"}", 200)
            .await?;
        self.idempotency.release_lock(tx, key).await?;

        info!(payment_id = %payment.id, status = %payment.status, "pipeline finalized successfully");
        Ok(payment)
    }

    /// Step D, permanent-failure path: fail the payment, cache the error,
    /// release the lock, and surface the original error to the caller.
    pub(super) async fn finalize_permanent_failure(
        &self,
        key: &str,
        payment: Payment,
        category: ErrorCategory,
        source: AppError,
    ) -> AppResult<Payment> {
        let mut tx = self.db.begin().await?;
        let result = self.finalize_permanent_failure_in_tx(&mut tx, key, payment, category, source).await;
        tx.commit().await?;
        result
    }

    /// Same as `finalize_permanent_failure` but against a transaction the
    /// caller already holds open.
    pub(super) async fn finalize_permanent_failure_in_tx(
        &self,
        tx: &mut Transaction<'_, MySql>,
        key: &str,
        mut payment: Payment,
        category: ErrorCategory,
        source: AppError,
    ) -> AppResult<Payment> {
        payment.fail(Some(category))?;

        self.payments.update_payment(tx, &payment).await?;
        let payload = format!("{{\"outcome\":\"failed\",\"message\":{:?}}}", source.to_string());
        self.idempotency
            .store_response(tx, key, payload.as_bytes(), source.status_code().as_u16() as i32)
            .await?;
        self.idempotency.release_lock(tx, key).await?;

        warn!(payment_id = %payment.id, category = ?category, error = %source, "pipeline permanently failed");
        Err(source)
    }

    /// Step D, transient/infrastructure path: leave the intermediate state
    /// and the lock untouched — the reconciler resumes later.
    pub(super) fn transient_failure(&self, payment_id: Uuid, category: ErrorCategory, source: AppError) -> AppError {
        warn!(%payment_id, ?category, error = %source, "pipeline left in intermediate state for reconciler");
        source
    }

    /// Translate a bank-call `Failure` into the categorized `AppError` the
    /// orchestrator returns to its caller.
    pub(super) fn categorize_bank_failure(failure: Failure) -> (ErrorCategory, AppError) {
        let category = categorize(&failure);
        let err = match failure {
            Failure::Bank(e) => AppError::Gateway(e.to_string()),
            Failure::Domain(DomainError::InvalidTransition(msg)) => AppError::InvalidTransition(msg),
            Failure::Domain(DomainError::AmountMismatch { expected, actual }) => {
                AppError::AmountMismatch { expected, actual }
            }
            Failure::Domain(e) => AppError::Precondition(e.to_string()),
            Failure::Cancelled => AppError::Gateway("bank call cancelled".to_string()),
            Failure::Other(msg) => AppError::Gateway(msg),
        };
        (category, err)
    }
}
