use chrono::Utc;
use sqlx::{MySql, MySqlPool, Transaction};
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::domain::IdempotencyRecord;

/// Durable registry enforcing at-most-once execution per idempotency key
/// (C3). The unique constraint on `idempotency_keys.key` is the
/// serialization point: whichever concurrent pipeline wins the insert
/// proceeds, the loser sees `DuplicateIdempotencyKey` and falls back to
/// waiting on the winner.
pub struct IdempotencyStore {
    pool: MySqlPool,
}

impl IdempotencyStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Insert a locked record. A duplicate-key violation means another
    /// pipeline already holds this key's slot.
    pub async fn acquire_lock(
        &self,
        tx: &mut Transaction<'_, MySql>,
        key: &str,
        payment_id: Uuid,
        request_hash: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (
                `key`, payment_id, request_hash, locked_at, response_payload, status_code, created_at
            ) VALUES (?, ?, ?, ?, NULL, NULL, ?)
            "#,
        )
        .bind(key)
        .bind(payment_id)
        .bind(request_hash)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::DuplicateIdempotencyKey;
                }
            }
            AppError::Internal(format!("failed to acquire idempotency lock: {e}"))
        })?;

        Ok(())
    }

    pub async fn find_key(&self, key: &str) -> AppResult<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT `key`, payment_id, request_hash, locked_at, response_payload, status_code, created_at
            FROM idempotency_keys
            WHERE `key` = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch idempotency key: {e}")))?;

        Ok(record)
    }

    /// The still-locked record for a payment, if any — used by the
    /// reconciler's orphan sweep (a `PENDING` payment is only ever the
    /// target of its initiating authorize's record).
    pub async fn find_locked_record_for_payment(
        &self,
        payment_id: Uuid,
    ) -> AppResult<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT `key`, payment_id, request_hash, locked_at, response_payload, status_code, created_at
            FROM idempotency_keys
            WHERE payment_id = ? AND locked_at IS NOT NULL
            LIMIT 1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to fetch idempotency key: {e}")))?;

        Ok(record)
    }

    /// Mark the record complete. `status_code` records the HTTP status the
    /// original caller observed so a cache hit can be replayed verbatim.
    pub async fn store_response(
        &self,
        tx: &mut Transaction<'_, MySql>,
        key: &str,
        payload: &[u8],
        status_code: i32,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET response_payload = ?, status_code = ?
            WHERE `key` = ?
            "#,
        )
        .bind(payload)
        .bind(status_code)
        .bind(key)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("failed to store idempotency response: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("idempotency key '{key}' not found")));
        }

        Ok(())
    }

    pub async fn release_lock(&self, tx: &mut Transaction<'_, MySql>, key: &str) -> AppResult<()> {
        sqlx::query("UPDATE idempotency_keys SET locked_at = NULL WHERE `key` = ?")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::Internal(format!("failed to release idempotency lock: {e}")))?;

        Ok(())
    }

    /// Records whose payment is stuck in an intermediate state, ready for
    /// another attempt, and not currently claimed by another reconciler
    /// worker (`FOR UPDATE SKIP LOCKED`).
    pub async fn find_stuck(
        &self,
        max_lock_age: chrono::Duration,
        max_retries: i32,
        batch_size: i64,
    ) -> AppResult<Vec<IdempotencyRecord>> {
        let cutoff = Utc::now() - max_lock_age;
        let records = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT ik.`key`, ik.payment_id, ik.request_hash, ik.locked_at,
                   ik.response_payload, ik.status_code, ik.created_at
            FROM idempotency_keys ik
            JOIN payments p ON p.id = ik.payment_id
            WHERE p.status IN ('CAPTURING', 'VOIDING', 'REFUNDING')
              AND (p.next_retry_at IS NULL OR p.next_retry_at <= NOW())
              AND p.attempt_count < ?
              AND ik.locked_at IS NOT NULL
              AND ik.locked_at < ?
            ORDER BY ik.locked_at ASC
            LIMIT ?
            FOR UPDATE OF ik SKIP LOCKED
            "#,
        )
        .bind(max_retries)
        .bind(cutoff)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("failed to scan stuck payments: {e}")))?;

        Ok(records)
    }
}
