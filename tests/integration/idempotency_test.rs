#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use paygate::core::tx::Db;
use paygate::orchestrator::{CaptureCommand, Orchestrator};
use paygate::store::{IdempotencyStore, PaymentStore};

use support::{test_pool, truncate_all, FakeBankGateway};

async fn insert_payment(pool: &sqlx::MySqlPool, order_id: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, ?, 'c-1', 5000, 'USD', 'PENDING', ?, ?, ?, 0)
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(pool)
    .await
    .unwrap();
    id
}

/// A second `acquire_lock` for the same key loses the race — the unique
/// constraint on `idempotency_keys.key` is what makes Step B safe under
/// concurrent duplicate requests.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn acquire_lock_rejects_duplicate_key() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let store = IdempotencyStore::new(pool.clone());
    let payment_id = insert_payment(&pool, "ord-idem-1").await;

    let mut tx = pool.begin().await.unwrap();
    store.acquire_lock(&mut tx, "k-dup", payment_id, "hash-a").await.unwrap();
    tx.commit().await.unwrap();

    let mut tx2 = pool.begin().await.unwrap();
    let result = store.acquire_lock(&mut tx2, "k-dup", payment_id, "hash-a").await;
    assert!(matches!(result, Err(paygate::AppError::DuplicateIdempotencyKey)));
}

/// `find_stuck` only surfaces records whose payment is in an intermediate
/// status, past the lock-age cutoff, and still under the retry ceiling —
/// it must not pick up a fresh lock or one that already exhausted retries.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn find_stuck_applies_age_and_retry_windows() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let store = IdempotencyStore::new(pool.clone());
    let now = Utc::now();

    let stuck_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, 'ord-stuck', 'c-1', 5000, 'USD', 'CAPTURING', ?, ?, ?, 1)
        "#,
    )
    .bind(stuck_id)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO idempotency_keys (`key`, payment_id, request_hash, locked_at, created_at) VALUES (?, ?, 'h', ?, ?)",
    )
    .bind("k-stuck")
    .bind(stuck_id)
    .bind(now - Duration::minutes(10))
    .bind(now - Duration::minutes(10))
    .execute(&pool)
    .await
    .unwrap();

    let fresh_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, 'ord-fresh', 'c-1', 5000, 'USD', 'CAPTURING', ?, ?, ?, 0)
        "#,
    )
    .bind(fresh_id)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO idempotency_keys (`key`, payment_id, request_hash, locked_at, created_at) VALUES (?, ?, 'h', ?, ?)",
    )
    .bind("k-fresh")
    .bind(fresh_id)
    .bind(now - Duration::seconds(5))
    .bind(now - Duration::seconds(5))
    .execute(&pool)
    .await
    .unwrap();

    let exhausted_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, 'ord-exhausted', 'c-1', 5000, 'USD', 'CAPTURING', ?, ?, ?, 5)
        "#,
    )
    .bind(exhausted_id)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO idempotency_keys (`key`, payment_id, request_hash, locked_at, created_at) VALUES (?, ?, 'h', ?, ?)",
    )
    .bind("k-exhausted")
    .bind(exhausted_id)
    .bind(now - Duration::minutes(10))
    .bind(now - Duration::minutes(10))
    .execute(&pool)
    .await
    .unwrap();

    let found = store
        .find_stuck(Duration::minutes(5), 5, 10)
        .await
        .expect("find_stuck should succeed");

    let keys: Vec<&str> = found.iter().map(|r| r.key.as_str()).collect();
    assert!(keys.contains(&"k-stuck"));
    assert!(!keys.contains(&"k-fresh"));
    assert!(!keys.contains(&"k-exhausted"));
}

async fn insert_authorized_payment(pool: &sqlx::MySqlPool, order_id: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            bank_auth_id, created_at, updated_at, authorized_at, expires_at, attempt_count
        ) VALUES (?, ?, 'c-1', 5000, 'USD', 'AUTHORIZED', ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(format!("A-{order_id}"))
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Two requests racing on the same idempotency key against an *existing*
/// payment (S6). Unlike `authorize`, `capture` never inserts a row, so the
/// only contention point is `IdempotencyStore::acquire_lock`'s unique
/// constraint on `key` — the loser falls into `wait_for_completion` and
/// both converge on the same finalized payment with exactly one bank call.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn concurrent_captures_with_same_key_converge_on_one_bank_call() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let payment_id = insert_authorized_payment(&pool, "ord-race-1").await;

    let bank = Arc::new(FakeBankGateway::new());
    bank.push_capture(Ok(paygate::bank::types::CaptureResponse {
        capture_id: "CAP-race-1".to_string(),
        authorization_id: "A-ord-race-1".to_string(),
        amount: 5000,
        currency: "USD".to_string(),
        status: "captured".to_string(),
        captured_at: Utc::now(),
    }));

    let orchestrator = Orchestrator::new(
        Db::new(pool.clone()),
        Arc::new(PaymentStore::new(pool.clone())),
        Arc::new(IdempotencyStore::new(pool.clone())),
        bank.clone(),
    );

    let cmd = CaptureCommand {
        payment_id,
        amount_cents: 5000,
    };
    let other_cmd = CaptureCommand {
        payment_id,
        amount_cents: 5000,
    };

    let (first, second) = tokio::join!(
        orchestrator.capture("k-race-1", cmd),
        orchestrator.capture("k-race-1", other_cmd),
    );

    let first = first.expect("first concurrent capture should succeed");
    let second = second.expect("second concurrent capture should converge on the same result");

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, paygate::domain::PaymentStatus::Captured);
    assert_eq!(second.status, paygate::domain::PaymentStatus::Captured);
    assert_eq!(bank.capture_call_count(), 1, "only one request should have reached the bank");
}
