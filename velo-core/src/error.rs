use uuid::Uuid;

/// Domain failures surfaced by dispatch operations. Callers map these to
/// transport codes; everything unexpected from storage lands in `Storage`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Order {0} is pay-on-delivery and has not been paid")]
    PaymentRequired(Uuid),
    #[error("Driver {0} has exceeded their cash credit limit")]
    CreditLimitExceeded(Uuid),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Cancellation pending: {0}")]
    CancellationPending(String),
    #[error("Settlement stopped at {stage}: {message}")]
    SettlementPartialFailure { stage: String, message: String },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DispatchError {
    pub fn invalid_transition(
        from: crate::models::OrderStatus,
        to: crate::models::OrderStatus,
    ) -> Self {
        DispatchError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        DispatchError::Storage(err.to_string())
    }

    /// Stable machine-readable discriminant for error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::OrderNotFound(_) => "order_not_found",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::PaymentRequired(_) => "payment_required",
            DispatchError::CreditLimitExceeded(_) => "credit_limit_exceeded",
            DispatchError::NotAuthorized(_) => "not_authorized",
            DispatchError::CancellationPending(_) => "cancellation_pending",
            DispatchError::SettlementPartialFailure { .. } => "settlement_partial_failure",
            DispatchError::Validation(_) => "validation",
            DispatchError::Storage(_) => "storage",
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
