pub mod idempotency_store;
pub mod payment_store;

pub use idempotency_store::IdempotencyStore;
pub use payment_store::PaymentStore;
