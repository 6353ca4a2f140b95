use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::core::error::AppResult;
use crate::orchestrator::Orchestrator;
use crate::store::{IdempotencyStore, PaymentStore};

const ORPHAN_MAX_AGE: chrono::Duration = chrono::Duration::minutes(10);
const STUCK_LOCK_MAX_AGE: chrono::Duration = chrono::Duration::minutes(5);

/// Background sweeper (C7): resumes stuck intermediate-state payments,
/// times out orphaned authorizations, and marks expired ones. Driven by a
/// ticker and a cancellation token, with three sub-jobs per tick.
pub struct Reconciler {
    orchestrator: Orchestrator,
    payments: Arc<PaymentStore>,
    idempotency: Arc<IdempotencyStore>,
    config: WorkerConfig,
}

impl Reconciler {
    pub fn new(
        orchestrator: Orchestrator,
        payments: Arc<PaymentStore>,
        idempotency: Arc<IdempotencyStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            orchestrator,
            payments,
            idempotency,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled. The in-flight tick is allowed to
    /// finish before the loop exits so a batch never straddles shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.config.interval_secs, "reconciler started");
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = shutdown.cancelled() => {
                    info!("reconciler shutting down after in-flight tick");
                    break;
                }
            }
        }
    }

    async fn run_tick(&self) {
        if let Err(e) = self.resume_stuck_operations().await {
            error!(error = %e, "reconciler job 1 (resume stuck operations) failed");
        }
        if let Err(e) = self.timeout_orphaned_authorizations().await {
            error!(error = %e, "reconciler job 2 (orphan timeout) failed");
        }
        if let Err(e) = self.expire_authorizations().await {
            error!(error = %e, "reconciler job 3 (expiration sweep) failed");
        }
    }

    /// Job 1: drive CAPTURING/VOIDING/REFUNDING payments forward by
    /// re-issuing their bank call under the same idempotency key. The
    /// `FOR UPDATE SKIP LOCKED` claim is only effective for as long as its
    /// transaction stays open, so that transaction spans the bank call and
    /// Step D's finalization — it is committed once, after `resume_stuck`
    /// returns, never in between.
    async fn resume_stuck_operations(&self) -> AppResult<()> {
        let records = self
            .idempotency
            .find_stuck(STUCK_LOCK_MAX_AGE, self.config.max_retries, self.config.batch_size)
            .await?;

        for record in records {
            let mut tx = self.orchestrator_db_begin().await?;
            let Some(payment) = self.payments.try_lock_for_reconciliation(&mut tx, record.payment_id).await? else {
                tx.rollback().await?;
                continue;
            };

            let outcome = self
                .orchestrator
                .resume_stuck(&mut tx, payment, &record.key, self.config.max_retries, self.config.max_backoff_minutes)
                .await;
            tx.commit().await?;

            match outcome {
                Ok(payment) => {
                    info!(payment_id = %payment.id, status = %payment.status, "reconciler resumed stuck payment");
                }
                Err(e) => {
                    warn!(payment_id = %record.payment_id, error = %e, "reconciler resume attempt did not complete");
                }
            }
        }

        Ok(())
    }

    /// Job 2: `PENDING` payments older than 10 minutes whose initiating
    /// idempotency record is still locked indicate a request that crashed
    /// before Step D ever ran — the bank may or may not have been called.
    async fn timeout_orphaned_authorizations(&self) -> AppResult<()> {
        let candidates = self
            .payments
            .find_orphaned_pending(ORPHAN_MAX_AGE, self.config.batch_size)
            .await?;

        for mut payment in candidates {
            let Some(record) = self.idempotency.find_locked_record_for_payment(payment.id).await? else {
                continue;
            };

            let mut tx = self.orchestrator_db_begin().await?;
            let Some(locked) = self.payments.try_lock_for_reconciliation(&mut tx, payment.id).await? else {
                tx.rollback().await?;
                continue;
            };
            payment = locked;

            if payment.status != crate::domain::PaymentStatus::Pending {
                tx.rollback().await?;
                continue;
            }

            payment.fail(None)?;
            self.payments.update_payment(&mut tx, &payment).await?;
            self.idempotency.release_lock(&mut tx, &record.key).await?;
            tx.commit().await?;

            warn!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                event = "ORPHANED_AUTHORIZATION_RISK",
                "payment orphaned before finalization; bank may hold an uncommitted authorization"
            );
        }

        Ok(())
    }

    /// Job 3: `AUTHORIZED` payments whose `expires_at` has passed. Before
    /// expiring a payment locally, cross-check the authorization against
    /// the bank — a capture that landed at the acquirer but never made it
    /// back to this record (a crash between Step C and Step D) must not be
    /// overwritten with EXPIRED.
    async fn expire_authorizations(&self) -> AppResult<()> {
        let candidates = self.payments.find_expired_authorizations(self.config.batch_size).await?;

        for payment in candidates {
            let mut tx = self.orchestrator_db_begin().await?;
            let Some(mut locked) = self.payments.try_lock_for_reconciliation(&mut tx, payment.id).await? else {
                tx.rollback().await?;
                continue;
            };

            if locked.status != crate::domain::PaymentStatus::Authorized {
                tx.rollback().await?;
                continue;
            }

            let Some(auth_id) = locked.bank_auth_id.clone() else {
                tx.rollback().await?;
                continue;
            };

            match self.orchestrator.bank().get_authorization(&auth_id).await {
                Ok(status) if status.status.eq_ignore_ascii_case("captured") => {
                    tx.rollback().await?;
                    warn!(
                        payment_id = %locked.id,
                        bank_status = %status.status,
                        "authorization shows captured at the bank; not expiring locally"
                    );
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tx.rollback().await?;
                    warn!(payment_id = %locked.id, error = %e, "bank cross-check failed; deferring expiry to next tick");
                    continue;
                }
            }

            locked.mark_expired()?;
            self.payments.update_payment(&mut tx, &locked).await?;
            tx.commit().await?;

            info!(payment_id = %locked.id, "authorization expired");
        }

        Ok(())
    }

    async fn orchestrator_db_begin(&self) -> AppResult<sqlx::Transaction<'static, sqlx::MySql>> {
        self.orchestrator.db().begin().await
    }
}
