use chrono::{DateTime, Utc};
use common::{CommissionRuleId, CurrencyCode, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CommissionError;

/// What a commission rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleReference {
    Site,
    Seller,
    Product,
    ProductType,
    ProductCollection,
}

impl RuleReference {
    /// Higher wins when several rules match one line.
    pub fn specificity(&self) -> u8 {
        match self {
            RuleReference::Product => 4,
            RuleReference::ProductType => 3,
            RuleReference::ProductCollection => 2,
            RuleReference::Seller => 1,
            RuleReference::Site => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleReference::Site => "site",
            RuleReference::Seller => "seller",
            RuleReference::Product => "product",
            RuleReference::ProductType => "product_type",
            RuleReference::ProductCollection => "product_collection",
        }
    }
}

impl std::fmt::Display for RuleReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateKind {
    /// A fixed amount per line, one entry per currency.
    Flat { amounts: Vec<Money> },
    /// A percentage of the line's base amount, e.g. `10` for 10 %.
    Percentage { percentage_rate: Decimal },
}

/// How a rule computes its commission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRate {
    #[serde(flatten)]
    pub kind: RateKind,
    #[serde(default)]
    pub include_tax: bool,
    #[serde(default)]
    pub include_shipping: bool,
    /// Lower bounds per currency.
    #[serde(default)]
    pub min_price: Vec<Money>,
    /// Upper bounds per currency.
    #[serde(default)]
    pub max_price: Vec<Money>,
}

fn amount_in(prices: &[Money], currency: &CurrencyCode) -> Option<Decimal> {
    prices
        .iter()
        .find(|p| &p.currency == currency)
        .map(|p| p.amount)
}

impl CommissionRate {
    pub fn percentage(percentage_rate: Decimal) -> Self {
        Self {
            kind: RateKind::Percentage { percentage_rate },
            include_tax: false,
            include_shipping: false,
            min_price: Vec::new(),
            max_price: Vec::new(),
        }
    }

    pub fn flat(amounts: Vec<Money>) -> Self {
        Self {
            kind: RateKind::Flat { amounts },
            include_tax: false,
            include_shipping: false,
            min_price: Vec::new(),
            max_price: Vec::new(),
        }
    }

    pub fn including_tax(mut self) -> Self {
        self.include_tax = true;
        self
    }

    pub fn including_shipping(mut self) -> Self {
        self.include_shipping = true;
        self
    }

    pub fn with_min(mut self, min: Money) -> Self {
        self.min_price.push(min);
        self
    }

    pub fn with_max(mut self, max: Money) -> Self {
        self.max_price.push(max);
        self
    }

    pub fn min_for(&self, currency: &CurrencyCode) -> Option<Decimal> {
        amount_in(&self.min_price, currency)
    }

    pub fn max_for(&self, currency: &CurrencyCode) -> Option<Decimal> {
        amount_in(&self.max_price, currency)
    }

    pub fn flat_amount_for(&self, currency: &CurrencyCode) -> Option<Decimal> {
        match &self.kind {
            RateKind::Flat { amounts } => amount_in(amounts, currency),
            RateKind::Percentage { .. } => None,
        }
    }

    fn validate(&self) -> Result<(), CommissionError> {
        match &self.kind {
            RateKind::Percentage { percentage_rate } => {
                if *percentage_rate < Decimal::ZERO || *percentage_rate > Decimal::ONE_HUNDRED {
                    return Err(CommissionError::InvalidRate(format!(
                        "percentage {percentage_rate} is outside 0..=100"
                    )));
                }
            }
            RateKind::Flat { amounts } => {
                if amounts.is_empty() {
                    return Err(CommissionError::InvalidRate(
                        "flat rate needs at least one amount".into(),
                    ));
                }
                if amounts.iter().any(Money::is_negative) {
                    return Err(CommissionError::InvalidRate(
                        "flat amounts must not be negative".into(),
                    ));
                }
            }
        }

        for min in &self.min_price {
            if let Some(max) = self.max_for(&min.currency)
                && min.amount > max
            {
                return Err(CommissionError::InvalidRate(format!(
                    "min {} exceeds max {max} for {}",
                    min.amount, min.currency
                )));
            }
        }
        Ok(())
    }
}

/// A configured commission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: CommissionRuleId,
    pub name: String,
    pub reference: RuleReference,
    /// Id of the referenced seller, product, type or collection; none for site rules.
    pub reference_id: Option<String>,
    pub is_active: bool,
    pub rate: CommissionRate,
    pub created_at: DateTime<Utc>,
}

impl CommissionRule {
    /// True if this rule and `other` target the same (reference, reference_id).
    pub fn same_target(&self, reference: RuleReference, reference_id: Option<&str>) -> bool {
        self.reference == reference && self.reference_id.as_deref() == reference_id
    }
}

/// Input for creating a commission rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommissionRule {
    pub name: String,
    pub reference: RuleReference,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub rate: CommissionRate,
}

fn default_active() -> bool {
    true
}

impl NewCommissionRule {
    pub fn new(
        name: impl Into<String>,
        reference: RuleReference,
        reference_id: Option<String>,
        rate: CommissionRate,
    ) -> Self {
        Self {
            name: name.into(),
            reference,
            reference_id,
            is_active: true,
            rate,
        }
    }

    pub fn site(name: impl Into<String>, rate: CommissionRate) -> Self {
        Self::new(name, RuleReference::Site, None, rate)
    }

    /// Validates the input and builds the rule.
    pub fn into_rule(self) -> Result<CommissionRule, CommissionError> {
        match (self.reference, self.reference_id.as_deref()) {
            (RuleReference::Site, Some(_)) => {
                return Err(CommissionError::InvalidReference(
                    "site rules take no reference_id".into(),
                ));
            }
            (RuleReference::Site, None) => {}
            (reference, None) | (reference, Some("")) => {
                return Err(CommissionError::InvalidReference(format!(
                    "{reference} rules need a reference_id"
                )));
            }
            _ => {}
        }
        if self.name.trim().is_empty() {
            return Err(CommissionError::InvalidReference("rule name is empty".into()));
        }
        self.rate.validate()?;

        Ok(CommissionRule {
            id: CommissionRuleId::new(),
            name: self.name,
            reference: self.reference,
            reference_id: self.reference_id,
            is_active: self.is_active,
            rate: self.rate,
            created_at: Utc::now(),
        })
    }
}

/// Fails if another active rule targets the same (reference, reference_id).
///
/// `candidate` itself is ignored so re-activating an active rule is allowed.
pub fn ensure_no_active_duplicate(
    existing: &[CommissionRule],
    candidate: &CommissionRule,
) -> Result<(), CommissionError> {
    if !candidate.is_active {
        return Ok(());
    }
    let duplicate = existing.iter().any(|r| {
        r.id != candidate.id
            && r.is_active
            && r.same_target(candidate.reference, candidate.reference_id.as_deref())
    });
    if duplicate {
        return Err(CommissionError::DuplicateActiveRule {
            reference: candidate.reference,
            reference_id: candidate.reference_id.clone(),
        });
    }
    Ok(())
}
