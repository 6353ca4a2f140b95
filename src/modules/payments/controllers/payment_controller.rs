use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::domain::Payment;
use crate::orchestrator::{AuthorizeCommand, CaptureCommand, Orchestrator, RefundCommand, VoidCommand};

use super::super::services::query_service::QueryService;

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub order_id: String,
    pub customer_id: String,
    pub amount: i64,
    pub currency: Option<String>,
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub payment_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    pub payment_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListByCustomerQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub bank_auth_id: Option<String>,
    pub bank_capture_id: Option<String>,
    pub bank_void_id: Option<String>,
    pub bank_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            customer_id: p.customer_id,
            amount_cents: p.amount_cents,
            currency: p.currency,
            status: p.status.to_string(),
            bank_auth_id: p.bank_auth_id,
            bank_capture_id: p.bank_capture_id,
            bank_void_id: p.bank_void_id,
            bank_refund_id: p.bank_refund_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
            authorized_at: p.authorized_at,
            captured_at: p.captured_at,
            voided_at: p.voided_at,
            refunded_at: p.refunded_at,
            expires_at: p.expires_at,
            attempt_count: p.attempt_count,
        }
    }
}

fn envelope(status: StatusCode, payload: impl Serialize) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": true,
        "data": payload,
    }))
}

fn idempotency_key(req: &HttpRequest) -> AppResult<String> {
    let key = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string();

    if key.is_empty() {
        return Err(AppError::validation("Idempotency-Key header is required"));
    }
    Ok(key)
}

fn validate_card_number(card_number: &str) -> AppResult<()> {
    if !(13..=19).contains(&card_number.len()) || !card_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("card_number must be 13-19 numeric digits"));
    }
    Ok(())
}

fn validate_cvv(cvv: &str) -> AppResult<()> {
    if cvv.len() != 3 || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("cvv must be exactly 3 numeric digits"));
    }
    Ok(())
}

fn validate_expiry(month: u32, year: u32) -> AppResult<()> {
    if !(1..=12).contains(&month) {
        return Err(AppError::validation("expiry_month must be between 1 and 12"));
    }
    if year < Utc::now().year() as u32 {
        return Err(AppError::validation("expiry_year must not be in the past"));
    }
    Ok(())
}

pub async fn authorize(
    orchestrator: web::Data<Orchestrator>,
    req: HttpRequest,
    body: web::Json<AuthorizeRequest>,
) -> AppResult<HttpResponse> {
    let key = idempotency_key(&req)?;
    let body = body.into_inner();

    if body.amount <= 0 {
        return Err(AppError::validation("amount must be positive"));
    }
    validate_card_number(&body.card_number)?;
    validate_cvv(&body.cvv)?;
    validate_expiry(body.expiry_month, body.expiry_year)?;

    let cmd = AuthorizeCommand {
        order_id: body.order_id,
        customer_id: body.customer_id,
        amount_cents: body.amount,
        currency: body.currency.unwrap_or_else(|| "USD".to_string()),
        card_number: body.card_number,
        cvv: body.cvv,
        expiry_month: body.expiry_month,
        expiry_year: body.expiry_year,
    };

    let payment = orchestrator.authorize(&key, cmd).await?;
    Ok(envelope(StatusCode::CREATED, PaymentResponse::from(payment)))
}

pub async fn capture(
    orchestrator: web::Data<Orchestrator>,
    req: HttpRequest,
    body: web::Json<CaptureRequest>,
) -> AppResult<HttpResponse> {
    let key = idempotency_key(&req)?;
    if body.amount <= 0 {
        return Err(AppError::validation("amount must be positive"));
    }

    let payment = orchestrator
        .capture(
            &key,
            CaptureCommand {
                payment_id: body.payment_id,
                amount_cents: body.amount,
            },
        )
        .await?;

    Ok(envelope(StatusCode::OK, PaymentResponse::from(payment)))
}

pub async fn void(
    orchestrator: web::Data<Orchestrator>,
    req: HttpRequest,
    body: web::Json<VoidRequest>,
) -> AppResult<HttpResponse> {
    let key = idempotency_key(&req)?;

    let payment = orchestrator
        .void(&key, VoidCommand { payment_id: body.payment_id })
        .await?;

    Ok(envelope(StatusCode::OK, PaymentResponse::from(payment)))
}

pub async fn refund(
    orchestrator: web::Data<Orchestrator>,
    req: HttpRequest,
    body: web::Json<RefundRequest>,
) -> AppResult<HttpResponse> {
    let key = idempotency_key(&req)?;
    if body.amount <= 0 {
        return Err(AppError::validation("amount must be positive"));
    }

    let payment = orchestrator
        .refund(
            &key,
            RefundCommand {
                payment_id: body.payment_id,
                amount_cents: body.amount,
            },
        )
        .await?;

    Ok(envelope(StatusCode::OK, PaymentResponse::from(payment)))
}

pub async fn get_by_order_id(
    query_service: web::Data<QueryService>,
    order_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let payment = query_service.find_by_order_id(&order_id).await?;
    Ok(envelope(StatusCode::OK, PaymentResponse::from(payment)))
}

pub async fn get_by_customer_id(
    query_service: web::Data<QueryService>,
    customer_id: web::Path<String>,
    query: web::Query<ListByCustomerQuery>,
) -> AppResult<HttpResponse> {
    let payments = query_service
        .find_by_customer_id(&customer_id, query.limit, query.offset)
        .await?;

    let response: Vec<PaymentResponse> = payments.into_iter().map(PaymentResponse::from).collect();
    Ok(envelope(StatusCode::OK, response))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/authorize", web::post().to(authorize))
        .route("/capture", web::post().to(capture))
        .route("/void", web::post().to(void))
        .route("/refund", web::post().to(refund))
        .service(
            web::scope("/payments")
                .route("/order/{order_id}", web::get().to(get_by_order_id))
                .route("/customer/{customer_id}", web::get().to(get_by_customer_id)),
        );
}
