//! Payout balance engine.
//!
//! The balance of an account is the signed sum of its balance transactions.
//! Folding is a pure function of a checkpoint and a batch, so a persisted
//! running total can be advanced without re-reading the full history and
//! recomputed from the ledger for audits.

use common::{CurrencyCode, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Captured sale credited to the seller.
    Capture,
    /// Platform commission debited from the seller.
    Commission,
    /// Payout reversal debited from the seller.
    Reversal,
}

impl TransactionKind {
    fn sign(&self) -> Decimal {
        match self {
            TransactionKind::Capture => Decimal::ONE,
            TransactionKind::Commission | TransactionKind::Reversal => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A credit or debit against a seller's balance.
///
/// `amount` is a non-negative magnitude; the kind decides the sign. The `id`
/// is a deduplication key derived from the originating event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: Money,
}

impl BalanceTransaction {
    pub fn new(id: impl Into<String>, kind: TransactionKind, amount: Money) -> Self {
        Self {
            id: id.into(),
            kind,
            amount,
        }
    }

    pub fn capture(id: impl Into<String>, amount: Money) -> Self {
        Self::new(id, TransactionKind::Capture, amount)
    }

    pub fn commission(id: impl Into<String>, amount: Money) -> Self {
        Self::new(id, TransactionKind::Commission, amount)
    }

    pub fn reversal(id: impl Into<String>, amount: Money) -> Self {
        Self::new(id, TransactionKind::Reversal, amount)
    }

    pub fn signed_amount(&self) -> Decimal {
        self.kind.sign() * self.amount.amount
    }
}

/// Running balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBalance {
    pub currency: CurrencyCode,
    pub total: Decimal,
}

impl PayoutBalance {
    pub fn zero(currency: impl Into<CurrencyCode>) -> Self {
        Self {
            currency: currency.into(),
            total: Decimal::ZERO,
        }
    }

    /// Lossless string form of the total.
    pub fn raw_total(&self) -> String {
        self.total.to_string()
    }

    pub fn as_money(&self) -> Money {
        Money::new(self.total, self.currency.clone())
    }
}

fn fold(
    current: &PayoutBalance,
    transactions: &[BalanceTransaction],
    direction: Decimal,
) -> Result<PayoutBalance, PayoutError> {
    let mut total = current.total;
    for tx in transactions {
        current.as_money().ensure_same_currency(&tx.amount.currency)?;
        if tx.amount.is_negative() {
            return Err(PayoutError::InvalidAmount(tx.amount.amount));
        }
        total = total
            .checked_add(direction * tx.signed_amount())
            .ok_or(common::MoneyError::Overflow)?;
    }
    Ok(PayoutBalance {
        currency: current.currency.clone(),
        total,
    })
}

/// Advances a balance by a batch of transactions.
///
/// Pass [`PayoutBalance::zero`] when no balance has been persisted yet.
/// Every transaction must be in the balance's currency.
pub fn apply_transactions(
    current: &PayoutBalance,
    transactions: &[BalanceTransaction],
) -> Result<PayoutBalance, PayoutError> {
    fold(current, transactions, Decimal::ONE)
}

/// Takes previously applied transactions back out of a balance.
pub fn revert_transactions(
    current: &PayoutBalance,
    transactions: &[BalanceTransaction],
) -> Result<PayoutBalance, PayoutError> {
    fold(current, transactions, Decimal::NEGATIVE_ONE)
}
