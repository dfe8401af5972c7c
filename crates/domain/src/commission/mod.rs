//! Commission rules and the engine that applies them to order lines.

mod engine;
mod rule;

pub use engine::{CommissionLine, LineContext, compute_commission, resolve, select_rule, total_commission};
pub use rule::{
    CommissionRate, CommissionRule, NewCommissionRule, RateKind, RuleReference,
    ensure_no_active_duplicate,
};

use common::{CommissionRuleId, CurrencyCode, ErrorKind, LineItemId, MoneyError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommissionError {
    /// No active rule matches the line at any level.
    #[error("No commission rule applies to line item {line_item_id}")]
    NoApplicableRule { line_item_id: LineItemId },

    /// A flat rate has no amount in the order's currency.
    #[error("Flat commission rate has no amount in {currency}")]
    CurrencyMismatch { currency: CurrencyCode },

    #[error("An active commission rule already exists for {reference} {reference_id:?}")]
    DuplicateActiveRule {
        reference: RuleReference,
        reference_id: Option<String>,
    },

    #[error("Invalid commission rate: {0}")]
    InvalidRate(String),

    #[error("Invalid rule reference: {0}")]
    InvalidReference(String),

    #[error("Commission rule not found: {0}")]
    RuleNotFound(CommissionRuleId),

    /// Commission lines are immutable once created.
    #[error("Line item {item_line_id} already has a commission line")]
    DuplicateLine { item_line_id: LineItemId },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl CommissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommissionError::NoApplicableRule { .. } | CommissionError::RuleNotFound(_) => {
                ErrorKind::NotFound
            }
            CommissionError::DuplicateActiveRule { .. } | CommissionError::DuplicateLine { .. } => {
                ErrorKind::Conflict
            }
            CommissionError::CurrencyMismatch { .. }
            | CommissionError::InvalidRate(_)
            | CommissionError::InvalidReference(_)
            | CommissionError::Money(_) => ErrorKind::Validation,
        }
    }
}
