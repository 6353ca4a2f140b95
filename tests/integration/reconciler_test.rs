#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use paygate::config::WorkerConfig;
use paygate::core::tx::Db;
use paygate::domain::PaymentStatus;
use paygate::orchestrator::Orchestrator;
use paygate::reconciler::Reconciler;
use paygate::store::{IdempotencyStore, PaymentStore};

use support::{test_pool, truncate_all, FakeBankGateway};

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        interval_secs: 1,
        batch_size: 50,
        max_retries: 5,
        max_backoff_minutes: 30,
    }
}

/// Runs the reconciler for a single tick by cancelling it shortly after
/// start, rather than reaching into its private tick method.
async fn run_one_tick(reconciler: Arc<Reconciler>) {
    let shutdown = CancellationToken::new();
    let shutdown_for_timer = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(1500)).await;
        shutdown_for_timer.cancel();
    });
    reconciler.run(shutdown).await;
}

/// S4: a capture left mid-flight by a transient bank failure is resumed
/// on the next tick and reaches CAPTURED once the bank recovers.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn s4_transient_failure_is_resumed_to_captured() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let db = Db::new(pool.clone());
    let payments = Arc::new(PaymentStore::new(pool.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(pool.clone()));
    let orchestrator = Orchestrator::new(db, payments.clone(), idempotency.clone(), bank.clone() as Arc<dyn paygate::bank::BankGateway>);

    let payment_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            bank_auth_id, created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, 'ord-recon-1', 'c-1', 5000, 'USD', 'CAPTURING', 'A1', ?, ?, ?, 1)
        "#,
    )
    .bind(payment_id)
    .bind(now)
    .bind(now)
    .bind(now + Duration::days(7))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO idempotency_keys (`key`, payment_id, request_hash, locked_at, created_at) VALUES (?, ?, 'h', ?, ?)",
    )
    .bind("k-recon-1")
    .bind(payment_id)
    .bind(now - Duration::minutes(6))
    .bind(now - Duration::minutes(6))
    .execute(&pool)
    .await
    .unwrap();

    bank.push_capture(Ok(paygate::bank::types::CaptureResponse {
        capture_id: "C-recon-1".to_string(),
        authorization_id: "A1".to_string(),
        amount: 5000,
        currency: "USD".to_string(),
        status: "captured".to_string(),
        captured_at: now,
    }));

    let reconciler = Arc::new(Reconciler::new(orchestrator, payments.clone(), idempotency, worker_config()));
    run_one_tick(reconciler).await;

    let reloaded = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PaymentStatus::Captured);
    assert_eq!(reloaded.bank_capture_id.as_deref(), Some("C-recon-1"));
    assert_eq!(bank.capture_call_count(), 1);
}

/// Job 2: a PENDING payment whose initiating request crashed before Step D
/// ever ran is failed once it is older than the orphan window.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn orphaned_pending_payment_is_failed() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let db = Db::new(pool.clone());
    let payments = Arc::new(PaymentStore::new(pool.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(pool.clone()));
    let orchestrator = Orchestrator::new(db, payments.clone(), idempotency.clone(), bank as Arc<dyn paygate::bank::BankGateway>);

    let payment_id = Uuid::new_v4();
    let old = Utc::now() - Duration::minutes(15);
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            created_at, updated_at, expires_at, attempt_count
        ) VALUES (?, 'ord-orphan-1', 'c-1', 5000, 'USD', 'PENDING', ?, ?, ?, 0)
        "#,
    )
    .bind(payment_id)
    .bind(old)
    .bind(old)
    .bind(old + Duration::days(7))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO idempotency_keys (`key`, payment_id, request_hash, locked_at, created_at) VALUES (?, ?, 'h', ?, ?)",
    )
    .bind("k-orphan-1")
    .bind(payment_id)
    .bind(old)
    .bind(old)
    .execute(&pool)
    .await
    .unwrap();

    let reconciler = Arc::new(Reconciler::new(orchestrator, payments.clone(), idempotency, worker_config()));
    run_one_tick(reconciler).await;

    let reloaded = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PaymentStatus::Failed);
}

/// Job 3: an AUTHORIZED payment past its `expires_at` is marked EXPIRED.
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn expired_authorization_is_marked_expired() {
    let Some(pool) = test_pool().await else { return };
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let db = Db::new(pool.clone());
    let payments = Arc::new(PaymentStore::new(pool.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(pool.clone()));
    let orchestrator = Orchestrator::new(db, payments.clone(), idempotency.clone(), bank as Arc<dyn paygate::bank::BankGateway>);

    let payment_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, customer_id, amount_cents, currency, status,
            bank_auth_id, created_at, updated_at, authorized_at, expires_at, attempt_count
        ) VALUES (?, 'ord-exp-1', 'c-1', 5000, 'USD', 'AUTHORIZED', 'A-exp-1', ?, ?, ?, ?, 0)
        "#,
    )
    .bind(payment_id)
    .bind(now - Duration::days(8))
    .bind(now - Duration::days(8))
    .bind(now - Duration::days(8))
    .bind(now - Duration::hours(1))
    .execute(&pool)
    .await
    .unwrap();

    let reconciler = Arc::new(Reconciler::new(orchestrator, payments.clone(), idempotency, worker_config()));
    run_one_tick(reconciler).await;

    let reloaded = payments.find_by_id(payment_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PaymentStatus::Expired);
}
