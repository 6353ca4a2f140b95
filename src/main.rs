use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{http::KeepAlive, web, App, HttpServer};
use tokio_util::sync::CancellationToken;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate::bank::HttpBankGateway;
use paygate::config::Config;
use paygate::core::tx::Db;
use paygate::middleware::{ErrorHandler, RequestId};
use paygate::modules::{health, payments};
use paygate::orchestrator::Orchestrator;
use paygate::reconciler::Reconciler;
use paygate::store::{IdempotencyStore, PaymentStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paygate=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("failed to load configuration");

    tracing::info!(env = %config.app_env, "starting paygate payment orchestration gateway");

    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("failed to create database pool");

    tracing::info!(
        max_open_conns = config.database.max_open_conns,
        "database pool initialized"
    );

    let db = Db::new(db_pool.clone());
    let payments_store = Arc::new(PaymentStore::new(db_pool.clone()));
    let idempotency_store = Arc::new(IdempotencyStore::new(db_pool.clone()));
    let bank_gateway: Arc<dyn paygate::bank::BankGateway> =
        Arc::new(HttpBankGateway::new(&config.bank_client));

    let orchestrator = Orchestrator::new(
        db,
        payments_store.clone(),
        idempotency_store.clone(),
        bank_gateway,
    );
    let query_service = Arc::new(payments::QueryService::new(payments_store.clone()));

    let shutdown = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(
        orchestrator.clone(),
        payments_store.clone(),
        idempotency_store.clone(),
        config.worker.clone(),
    ));

    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(query_service.clone()))
            .app_data(web::Data::new(db_pool.clone()))
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .wrap(RequestId)
            .wrap(ErrorHandler)
            .configure(health::controllers::configure)
            .service(web::scope("/api/v1").configure(payments::controllers::configure))
    })
    .workers(config.server.workers)
    .client_request_timeout(Duration::from_secs(config.server.read_timeout_secs))
    .client_disconnect_timeout(Duration::from_secs(config.server.write_timeout_secs))
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(config.server.idle_timeout_secs)))
    .bind(&bind_address)?
    .run();

    let server_handle = server.handle();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_for_signal.cancel();
        server_handle.stop(true).await;
    });

    tracing::info!(address = %bind_address, "server listening");

    let result = server.await;

    shutdown.cancel();
    let _ = reconciler_handle.await;

    result
}
