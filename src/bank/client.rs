use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::config::BankClientConfig;
use crate::domain::{BankError, Failure};

use super::types::{
    AuthorizationStatusResponse, AuthorizeRequest, AuthorizeResponse, BankErrorBody,
    CaptureRequest, CaptureResponse, RefundRequest, RefundResponse, VoidRequest, VoidResponse,
};

/// The four mutating bank operations plus the lookup the reconciler can use
/// to cross-check an authorization's status against the acquirer. Every
/// mutating call carries the orchestrator's idempotency key as a header so
/// retried HTTP calls against the same bank operation are themselves
/// deduplicated by the bank.
#[async_trait]
pub trait BankGateway: Send + Sync {
    async fn authorize(
        &self,
        req: AuthorizeRequest,
        idempotency_key: &str,
    ) -> Result<AuthorizeResponse, Failure>;

    async fn capture(
        &self,
        req: CaptureRequest,
        idempotency_key: &str,
    ) -> Result<CaptureResponse, Failure>;

    async fn void(&self, req: VoidRequest, idempotency_key: &str) -> Result<VoidResponse, Failure>;

    async fn refund(
        &self,
        req: RefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundResponse, Failure>;

    async fn get_authorization(
        &self,
        authorization_id: &str,
    ) -> Result<AuthorizationStatusResponse, Failure>;
}

/// HTTP client for the acquirer's REST API. Transport-level
/// failures (timeouts, connection resets) are retried by the middleware
/// before ever reaching the orchestrator; a response that comes back is
/// translated into a typed `Failure::Bank` instead.
pub struct HttpBankGateway {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpBankGateway {
    pub fn new(config: &BankClientConfig) -> Self {
        let inner = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.conn_timeout_secs))
            .build()
            .expect("failed to build bank http client");

        let min_retry_interval = Duration::from_millis(config.retry_base_delay_ms);
        let max_retry_interval = min_retry_interval * 16;
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(min_retry_interval, max_retry_interval)
            .build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: config.base_url.clone(),
        }
    }

    async fn post<Req: serde::Serialize + Sync, Res: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
        idempotency_key: &str,
    ) -> Result<Res, Failure> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Failure::Other(format!("bank transport error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<BankErrorBody>()
                .await
                .unwrap_or_else(|_| BankErrorBody {
                    error: "unknown_error".to_string(),
                    message: format!("bank responded with status {status} and an unparseable body"),
                });
            return Err(Failure::Bank(BankError {
                status: status.as_u16(),
                code: body.error,
                message: body.message,
            }));
        }

        response
            .json::<Res>()
            .await
            .map_err(|e| Failure::Other(format!("failed to parse bank response: {e}")))
    }
}

#[async_trait]
impl BankGateway for HttpBankGateway {
    async fn authorize(
        &self,
        req: AuthorizeRequest,
        idempotency_key: &str,
    ) -> Result<AuthorizeResponse, Failure> {
        self.post("/api/v1/authorizations", &req, idempotency_key).await
    }

    async fn capture(
        &self,
        req: CaptureRequest,
        idempotency_key: &str,
    ) -> Result<CaptureResponse, Failure> {
        self.post("/api/v1/captures", &req, idempotency_key).await
    }

    async fn void(&self, req: VoidRequest, idempotency_key: &str) -> Result<VoidResponse, Failure> {
        self.post("/api/v1/voids", &req, idempotency_key).await
    }

    async fn refund(
        &self,
        req: RefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundResponse, Failure> {
        self.post("/api/v1/refunds", &req, idempotency_key).await
    }

    async fn get_authorization(
        &self,
        authorization_id: &str,
    ) -> Result<AuthorizationStatusResponse, Failure> {
        let url = format!("{}/api/v1/authorizations/{}", self.base_url, authorization_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Failure::Other(format!("bank transport error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<BankErrorBody>()
                .await
                .unwrap_or_else(|_| BankErrorBody {
                    error: "unknown_error".to_string(),
                    message: format!("bank responded with status {status} and an unparseable body"),
                });
            return Err(Failure::Bank(BankError {
                status: status.as_u16(),
                code: body.error,
                message: body.message,
            }));
        }

        response
            .json::<AuthorizationStatusResponse>()
            .await
            .map_err(|e| Failure::Other(format!("failed to parse bank response: {e}")))
    }
}
