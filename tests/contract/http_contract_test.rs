#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use chrono::Utc;
use serde_json::{json, Value};

use paygate::core::tx::Db;
use paygate::modules::{health, payments};
use paygate::orchestrator::Orchestrator;
use paygate::store::{IdempotencyStore, PaymentStore};

use support::{test_pool, truncate_all, FakeBankGateway};

macro_rules! skip_without_db {
    () => {
        match test_pool().await {
            Some(pool) => pool,
            None => return,
        }
    };
}

fn build_app_deps(
    pool: sqlx::MySqlPool,
    bank: Arc<FakeBankGateway>,
) -> (Orchestrator, Arc<payments::QueryService>) {
    let db = Db::new(pool.clone());
    let payment_store = Arc::new(PaymentStore::new(pool.clone()));
    let idempotency_store = Arc::new(IdempotencyStore::new(pool));
    let orchestrator = Orchestrator::new(db, payment_store.clone(), idempotency_store, bank);
    let query_service = Arc::new(payments::QueryService::new(payment_store));
    (orchestrator, query_service)
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn authorize_happy_path_returns_201_with_envelope() {
    let pool = skip_without_db!();
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    bank.push_authorize(Ok(paygate::bank::types::AuthorizeResponse {
        authorization_id: "A-http-1".to_string(),
        amount: 5000,
        currency: "USD".to_string(),
        status: "authorized".to_string(),
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::days(7),
    }));
    let (orchestrator, query_service) = build_app_deps(pool, bank);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(query_service))
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/authorize")
        .insert_header(("Idempotency-Key", "k-http-1"))
        .set_json(json!({
            "order_id": "ord-http-1",
            "customer_id": "c-1",
            "amount": 5000,
            "currency": "USD",
            "card_number": "4111111111111111",
            "cvv": "123",
            "expiry_month": 12,
            "expiry_year": 2030,
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("AUTHORIZED"));
    assert_eq!(body["data"]["bank_auth_id"], json!("A-http-1"));
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn authorize_without_idempotency_key_returns_400() {
    let pool = skip_without_db!();
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let (orchestrator, query_service) = build_app_deps(pool, bank);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(query_service))
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/authorize")
        .set_json(json!({
            "order_id": "ord-http-2",
            "customer_id": "c-1",
            "amount": 5000,
            "currency": "USD",
            "card_number": "4111111111111111",
            "cvv": "123",
            "expiry_month": 12,
            "expiry_year": 2030,
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn authorize_with_malformed_card_number_returns_400() {
    let pool = skip_without_db!();
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let (orchestrator, query_service) = build_app_deps(pool, bank);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(query_service))
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/authorize")
        .insert_header(("Idempotency-Key", "k-http-3"))
        .set_json(json!({
            "order_id": "ord-http-3",
            "customer_id": "c-1",
            "amount": 5000,
            "currency": "USD",
            "card_number": "not-a-card",
            "cvv": "123",
            "expiry_month": 12,
            "expiry_year": 2030,
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn get_by_order_id_for_unknown_order_returns_404() {
    let pool = skip_without_db!();
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    let (orchestrator, query_service) = build_app_deps(pool, bank);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(query_service))
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/payments/order/does-not-exist")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], json!("PAYMENT_NOT_FOUND"));
}

/// A capture for the wrong amount surfaces as 409 with the
/// `AMOUNT_MISMATCH` code, and never reaches the bank.
#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn capture_with_wrong_amount_returns_409() {
    let pool = skip_without_db!();
    truncate_all(&pool).await;

    let bank = Arc::new(FakeBankGateway::new());
    bank.push_authorize(Ok(paygate::bank::types::AuthorizeResponse {
        authorization_id: "A-http-4".to_string(),
        amount: 5000,
        currency: "USD".to_string(),
        status: "authorized".to_string(),
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::days(7),
    }));
    let (orchestrator, query_service) = build_app_deps(pool, bank.clone());

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(query_service))
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure)),
    )
    .await;

    let auth_req = test::TestRequest::post()
        .uri("/api/v1/authorize")
        .insert_header(("Idempotency-Key", "k-http-4"))
        .set_json(json!({
            "order_id": "ord-http-4",
            "customer_id": "c-1",
            "amount": 5000,
            "currency": "USD",
            "card_number": "4111111111111111",
            "cvv": "123",
            "expiry_month": 12,
            "expiry_year": 2030,
        }))
        .to_request();
    let auth_resp: Value = test::call_and_read_body_json(&app, auth_req).await;
    let payment_id = auth_resp["data"]["id"].as_str().unwrap().to_string();

    let cap_req = test::TestRequest::post()
        .uri("/api/v1/capture")
        .insert_header(("Idempotency-Key", "k-http-4-cap"))
        .set_json(json!({ "payment_id": payment_id, "amount": 1 }))
        .to_request();

    let resp = test::call_service(&app, cap_req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], json!("AMOUNT_MISMATCH"));
    assert_eq!(bank.capture_call_count(), 0);
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn readiness_check_returns_200_when_database_is_reachable() {
    let pool = skip_without_db!();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(pool))
            .configure(health::controllers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
