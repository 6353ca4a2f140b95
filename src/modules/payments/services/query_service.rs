use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::domain::Payment;
use crate::store::PaymentStore;

const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_OFFSET: i64 = 0;

/// Read-only lookups (C8). No authorization checks — those belong to the
/// ingress layer, not here.
pub struct QueryService {
    payments: Arc<PaymentStore>,
}

impl QueryService {
    pub fn new(payments: Arc<PaymentStore>) -> Self {
        Self { payments }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Payment> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment {id} not found")))
    }

    pub async fn find_by_order_id(&self, order_id: &str) -> AppResult<Payment> {
        self.payments
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment for order '{order_id}' not found")))
    }

    pub async fn find_by_customer_id(
        &self,
        customer_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<Payment>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 100);
        let offset = offset.unwrap_or(DEFAULT_OFFSET).max(0);
        self.payments.find_by_customer_id(customer_id, limit, offset).await
    }
}
