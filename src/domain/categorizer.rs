use serde::{Deserialize, Serialize};

/// Categorizer output (C2). Drives every retry/fail decision in the
/// orchestrator (step D) and the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(16)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    /// Safe to retry (bank 5xx, transport/context cancellation, internal_error).
    Transient,
    /// Card/business reject at the bank — fail fast, never retry.
    Permanent,
    /// Domain invariant violated — report as 4xx, do not retry.
    BusinessRule,
    /// Bad input or not-found at the bank.
    ClientError,
    /// Local failure (DB, pool exhaustion, etc.) — retry.
    Infrastructure,
}

impl ErrorCategory {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCategory::Transient | ErrorCategory::Infrastructure)
    }
}

/// A structured error returned by the bank client (C5). `code` is the
/// bank's machine-readable error string (from its `{ error, message }`
/// body); `status` is the HTTP status of the response.
#[derive(Debug, Clone)]
pub struct BankError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// Domain invariant violations raised by the Payment Aggregate (C1) or by
/// the orchestrator's own precondition checks (C6).
#[derive(Debug, Clone)]
pub enum DomainError {
    InvalidTransition(String),
    InvalidState(String),
    AmountMismatch { expected: i64, actual: i64 },
    PaymentExpired,
}

/// Anything the orchestrator's Step C / Step D can observe. This is the
/// input to `categorize` — a sealed union, not an exception hierarchy.
#[derive(Debug, Clone)]
pub enum Failure {
    /// The outer request's cancellation token fired, or a deadline elapsed.
    Cancelled,
    Bank(BankError),
    Domain(DomainError),
    /// Anything else (local I/O, unexpected panics surfaced as errors, …).
    Other(String),
}

const PERMANENT_BANK_CODES: &[&str] = &[
    "invalid_card",
    "invalid_cvv",
    "card_expired",
    "insufficient_funds",
    "invalid_amount",
    "amount_mismatch",
    "authorization_already_used",
    "already_captured",
    "already_voided",
    "already_refunded",
    "authorization_expired",
];

/// Pure classification. Rules are evaluated top-down in order of
/// specificity — later rules are more general and act as a catch-all.
pub fn categorize(failure: &Failure) -> ErrorCategory {
    match failure {
        Failure::Cancelled => ErrorCategory::Transient,

        Failure::Bank(err) => {
            if err.status >= 500 {
                return ErrorCategory::Transient;
            }
            if PERMANENT_BANK_CODES.contains(&err.code.as_str()) {
                return ErrorCategory::Permanent;
            }
            if err.code.ends_with("_not_found") || err.code == "missing_idempotency_key" {
                return ErrorCategory::ClientError;
            }
            if err.code == "internal_error" {
                return ErrorCategory::Transient;
            }
            // Unclassified bank error: conservative default, no double-charge.
            ErrorCategory::Permanent
        }

        Failure::Domain(_) => ErrorCategory::BusinessRule,

        Failure::Other(_) => ErrorCategory::Transient,
    }
}

impl std::fmt::Display for BankError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bank error {} ({}): {}", self.code, self.status, self.message)
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::InvalidTransition(s) => write!(f, "invalid transition: {s}"),
            DomainError::InvalidState(s) => write!(f, "invalid state: {s}"),
            DomainError::AmountMismatch { expected, actual } => {
                write!(f, "amount mismatch: expected {expected}, got {actual}")
            }
            DomainError::PaymentExpired => write!(f, "authorization has expired"),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Cancelled => write!(f, "request cancelled"),
            Failure::Bank(e) => write!(f, "{e}"),
            Failure::Domain(e) => write!(f, "{e}"),
            Failure::Other(s) => write!(f, "{s}"),
        }
    }
}
