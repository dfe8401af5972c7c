//! Exact decimal money.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ISO 4217 currency code, normalised to lower case (`"usd"`, `"eur"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a currency code, trimming and lower-casing the input.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Errors raised by money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The two operands are in different currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    /// The result does not fit the decimal representation.
    #[error("Amount overflow")]
    Overflow,
}

/// An amount of money in a given currency.
///
/// The amount is an arbitrary-precision decimal. Serialised amounts use the
/// decimal's string form, which round-trips without loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl Money {
    /// Creates a new amount.
    pub fn new(amount: Decimal, currency: impl Into<CurrencyCode>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Returns a zero amount in the given currency.
    pub fn zero(currency: impl Into<CurrencyCode>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Returns the lossless string form of the amount.
    pub fn raw(&self) -> String {
        self.amount.to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Fails unless `other` shares this amount's currency.
    pub fn ensure_same_currency(&self, other: &CurrencyCode) -> Result<(), MoneyError> {
        if &self.currency == other {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: other.clone(),
            })
        }
    }

    /// Adds another amount of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other.currency)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Subtracts another amount of the same currency.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other.currency)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Returns the amount with its sign flipped.
    pub fn negated(&self) -> Money {
        Money::new(-self.amount, self.currency.clone())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.as_str().to_uppercase())
    }
}
