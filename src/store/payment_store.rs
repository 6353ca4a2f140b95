use sqlx::{MySql, MySqlPool, Transaction};
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::domain::Payment;

/// Durable persistence of the Payment Aggregate (C4). Mutating methods take
/// an explicit transaction handle rather than assuming an ambient one —
/// callers own transaction scoping.
pub struct PaymentStore {
    pool: MySqlPool,
}

const SELECT_COLUMNS: &str = r#"
    id, order_id, customer_id, amount_cents, currency, status,
    bank_auth_id, bank_capture_id, bank_void_id, bank_refund_id,
    created_at, updated_at, authorized_at, captured_at, voided_at, refunded_at, expires_at,
    attempt_count, next_retry_at, last_error_category
"#;

impl PaymentStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Insert a new payment row. A duplicate UUID (practically impossible,
    /// but defends against a reused primary key) surfaces as `AppError::Internal`.
    pub async fn create_payment(
        &self,
        tx: &mut Transaction<'_, MySql>,
        payment: &Payment,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, customer_id, amount_cents, currency, status,
                bank_auth_id, bank_capture_id, bank_void_id, bank_refund_id,
                created_at, updated_at, authorized_at, captured_at, voided_at, refunded_at, expires_at,
                attempt_count, next_retry_at, last_error_category
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.order_id)
        .bind(&payment.customer_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.bank_auth_id)
        .bind(&payment.bank_capture_id)
        .bind(&payment.bank_void_id)
        .bind(&payment.bank_refund_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.authorized_at)
        .bind(payment.captured_at)
        .bind(payment.voided_at)
        .bind(payment.refunded_at)
        .bind(payment.expires_at)
        .bind(payment.attempt_count)
        .bind(payment.next_retry_at)
        .bind(payment.last_error_category)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create payment: {e}")))?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch payment: {e}")))?;

        Ok(payment)
    }

    /// Row-locked read used by every mutating pipeline step (Step B/D,
    /// reconciler jobs). Must be called inside `tx`; the lock is held until
    /// the transaction commits or rolls back.
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut Transaction<'_, MySql>,
        id: Uuid,
    ) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch payment with lock: {e}")))?;

        Ok(payment)
    }

    /// Full-row update. Zero rows affected (the id vanished between the
    /// locked read and this write, which cannot happen under a held lock
    /// but is still checked) surfaces as `NotFound`.
    pub async fn update_payment(
        &self,
        tx: &mut Transaction<'_, MySql>,
        payment: &Payment,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = ?,
                bank_auth_id = ?, bank_capture_id = ?, bank_void_id = ?, bank_refund_id = ?,
                updated_at = ?, authorized_at = ?, captured_at = ?, voided_at = ?, refunded_at = ?, expires_at = ?,
                attempt_count = ?, next_retry_at = ?, last_error_category = ?
            WHERE id = ?
            "#,
        )
        .bind(payment.status)
        .bind(&payment.bank_auth_id)
        .bind(&payment.bank_capture_id)
        .bind(&payment.bank_void_id)
        .bind(&payment.bank_refund_id)
        .bind(payment.updated_at)
        .bind(payment.authorized_at)
        .bind(payment.captured_at)
        .bind(payment.voided_at)
        .bind(payment.refunded_at)
        .bind(payment.expires_at)
        .bind(payment.attempt_count)
        .bind(payment.next_retry_at)
        .bind(payment.last_error_category)
        .bind(payment.id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("failed to update payment: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("payment {} not found", payment.id)));
        }

        Ok(())
    }

    pub async fn find_by_order_id(&self, order_id: &str) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE order_id = ?"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch payment: {e}")))?;

        Ok(payment)
    }

    pub async fn find_by_customer_id(
        &self,
        customer_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE customer_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(customer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch payments: {e}")))?;

        Ok(payments)
    }

    /// Same as `find_by_id_for_update` but never blocks: a row already
    /// locked by a concurrent worker is treated as absent. Used by the
    /// reconciler so two sweeper ticks never fight over the same payment.
    pub async fn try_lock_for_reconciliation(
        &self,
        tx: &mut Transaction<'_, MySql>,
        id: Uuid,
    ) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = ? FOR UPDATE SKIP LOCKED"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch payment with lock: {e}")))?;

        Ok(payment)
    }

    /// Payments in `PENDING` older than `max_age` whose idempotency lock is
    /// still held — orphan candidates for reconciler Job 2.
    pub async fn find_orphaned_pending(
        &self,
        max_age: chrono::Duration,
        batch_size: i64,
    ) -> AppResult<Vec<Payment>> {
        let cutoff = chrono::Utc::now() - max_age;
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments
             WHERE status = 'PENDING' AND created_at < ?
             ORDER BY created_at ASC
             LIMIT ?"
        ))
        .bind(cutoff)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to scan orphaned payments: {e}")))?;

        Ok(payments)
    }

    /// `AUTHORIZED` payments whose `expires_at` is past — candidates for
    /// reconciler Job 3.
    pub async fn find_expired_authorizations(&self, batch_size: i64) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments
             WHERE status = 'AUTHORIZED' AND expires_at IS NOT NULL AND expires_at < NOW()
             ORDER BY expires_at ASC
             LIMIT ?"
        ))
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to scan expired authorizations: {e}")))?;

        Ok(payments)
    }
}
