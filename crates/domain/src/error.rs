//! Domain error types.

use common::{ErrorKind, MoneyError};
use event_store::EventStoreError;
use thiserror::Error;

use crate::commission::CommissionError;
use crate::order_set::OrderError;
use crate::payout::PayoutError;
use crate::split_payment::SplitPaymentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Commission error: {0}")]
    Commission(#[from] CommissionError),

    #[error("Split payment error: {0}")]
    SplitPayment(#[from] SplitPaymentError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(aggregate_type: &'static str, aggregate_id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
        }
    }

    /// Classifies the error for retry and reporting decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::Commission(e) => e.kind(),
            DomainError::SplitPayment(e) => e.kind(),
            DomainError::Payout(e) => e.kind(),
            DomainError::Money(_) => ErrorKind::Validation,
            DomainError::AggregateNotFound { .. } => ErrorKind::NotFound,
            DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, CurrencyCode};
    use event_store::Version;

    #[test]
    fn kinds_follow_the_source_error() {
        let conflict = DomainError::from(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::first(),
            actual: Version::new(2),
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let money = DomainError::from(MoneyError::CurrencyMismatch {
            expected: CurrencyCode::new("usd"),
            actual: CurrencyCode::new("eur"),
        });
        assert_eq!(money.kind(), ErrorKind::Validation);

        assert_eq!(
            DomainError::not_found("PayoutAccount", "acc_1").kind(),
            ErrorKind::NotFound
        );
    }
}
