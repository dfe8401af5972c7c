//! Seller payout accounts, balances, payouts and reversals.

mod aggregate;
mod balance;
mod events;
mod service;

pub use aggregate::{
    AccountStatus, Onboarding, Payout, PayoutAccount, PayoutReversal, WebhookAction,
};
pub use balance::{
    BalanceTransaction, PayoutBalance, TransactionKind, apply_transactions, revert_transactions,
};
pub use events::{
    AccountDataData, AccountDisabledData, OnboardingUpsertedData, PayoutAccountCreatedData,
    PayoutAccountEvent, PayoutCreatedData, PayoutReversalCreatedData, PayoutReversalVoidedData,
    PayoutVoidedData, TransactionsAppliedData, TransactionsRevertedData,
};
pub use service::PayoutAccountService;

use common::{CurrencyCode, ErrorKind, MoneyError, OrderId, PayoutId, PayoutReversalId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Payout account already exists")]
    AlreadyExists,

    #[error("Payout account does not exist")]
    NotInitialized,

    #[error("Cannot {action} a payout account in status {status}")]
    InvalidTransition {
        status: AccountStatus,
        action: &'static str,
    },

    /// Payouts need an active account.
    #[error("Payout account is {status}, not active")]
    AccountNotActive { status: AccountStatus },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Payout not found: {0}")]
    PayoutNotFound(PayoutId),

    #[error("Payout {0} is voided")]
    PayoutVoided(PayoutId),

    #[error("Payout {0} has active reversals")]
    PayoutHasReversals(PayoutId),

    #[error("Order {order_id} already has a payout")]
    DuplicatePayout { order_id: OrderId },

    #[error("Reversal of {requested} exceeds reversible amount {available}")]
    ReversalExceedsPayout {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Payout reversal not found: {0}")]
    ReversalNotFound(PayoutReversalId),

    /// The persisted checkpoint disagrees with the ledger.
    #[error("Balance checkpoint {checkpoint} {currency} differs from ledger sum {recomputed}")]
    ReconciliationMismatch {
        currency: CurrencyCode,
        checkpoint: Decimal,
        recomputed: Decimal,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl PayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PayoutError::AlreadyExists | PayoutError::DuplicatePayout { .. } => ErrorKind::Conflict,
            PayoutError::NotInitialized
            | PayoutError::PayoutNotFound(_)
            | PayoutError::ReversalNotFound(_) => ErrorKind::NotFound,
            PayoutError::ReconciliationMismatch { .. } => ErrorKind::Internal,
            PayoutError::InvalidTransition { .. }
            | PayoutError::AccountNotActive { .. }
            | PayoutError::InvalidAmount(_)
            | PayoutError::PayoutVoided(_)
            | PayoutError::PayoutHasReversals(_)
            | PayoutError::ReversalExceedsPayout { .. }
            | PayoutError::Money(_) => ErrorKind::Validation,
        }
    }
}
