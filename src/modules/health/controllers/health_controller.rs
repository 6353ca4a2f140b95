use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: bool,
}

/// GET /health - liveness probe. Never touches the database: a stuck pool
/// should surface on `/ready`, not here.
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /ready - readiness probe, pings the database pool.
pub async fn readiness_check(pool: web::Data<MySqlPool>) -> impl Responder {
    let database = sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await;
    let ready = database.is_ok();

    if let Err(ref e) = database {
        tracing::error!(error = %e, "database readiness check failed");
    }

    let response = ReadinessResponse { ready, database: ready };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check));
}
