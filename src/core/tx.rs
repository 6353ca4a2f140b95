use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::error::AppResult;

/// Thin wrapper around the connection pool. Repository methods that must
/// participate in a multi-step commit (C6 step B and step D) take an
/// explicit `&mut Transaction<'_, MySql>` parameter instead of owning the
/// pool themselves — the transactional handle is passed around as a plain
/// value. `Db` exists to hand out connections and to start/finish those
/// transactions; it holds no business logic.
///
/// Isolation is MySQL's default (read-committed). Call sites that
/// read-then-write a payment row always do so through `FindByIDForUpdate`,
/// which takes an explicit row lock rather than relying on SERIALIZABLE.
#[derive(Clone)]
pub struct Db {
    pool: MySqlPool,
}

impl Db {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Start a new transaction. Callers commit or roll back explicitly;
    /// sqlx rolls back on `Drop` if neither happens (covers panics too).
    pub async fn begin(&self) -> AppResult<Transaction<'static, MySql>> {
        Ok(self.pool.begin().await?)
    }
}
