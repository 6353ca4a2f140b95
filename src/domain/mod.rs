pub mod categorizer;
pub mod idempotency;
pub mod payment;

pub use categorizer::{categorize, BankError, DomainError, ErrorCategory, Failure};
pub use idempotency::IdempotencyRecord;
pub use payment::{Payment, PaymentStatus};
