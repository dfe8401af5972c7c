//! Per-seller slices of one customer payment.

mod aggregate;
mod events;
mod service;

pub use aggregate::{RefundRecord, SplitOrderPayment, SplitPaymentStatus};
pub use events::{
    CaptureRevertedData, RefundRevertedData, SplitPaymentCanceledData, SplitPaymentCapturedData,
    SplitPaymentCreatedData, SplitPaymentEvent, SplitPaymentRefundedData,
};
pub use service::SplitPaymentService;

use common::{ErrorKind, MoneyError};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitPaymentError {
    #[error("Split payment already exists")]
    AlreadyExists,

    #[error("Split payment does not exist")]
    NotInitialized,

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// The refund is larger than what is still refundable.
    #[error("Refund of {requested} exceeds refundable amount {available}")]
    RefundExceedsCaptured {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Cannot {action} a split payment in status {status}")]
    InvalidState {
        status: SplitPaymentStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl SplitPaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitPaymentError::AlreadyExists => ErrorKind::Conflict,
            SplitPaymentError::NotInitialized => ErrorKind::NotFound,
            SplitPaymentError::InvalidAmount(_)
            | SplitPaymentError::RefundExceedsCaptured { .. }
            | SplitPaymentError::InvalidState { .. }
            | SplitPaymentError::Money(_) => ErrorKind::Validation,
        }
    }
}
