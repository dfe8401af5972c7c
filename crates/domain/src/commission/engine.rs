use chrono::{DateTime, Utc};
use common::{
    CollectionId, CommissionLineId, CommissionRuleId, CurrencyCode, LineItemId, Money, OrderId,
    ProductId, ProductTypeId, SellerId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CommissionError, CommissionRule, RateKind, RuleReference};
use crate::cart::LineItem;

/// Everything the engine needs to know about one order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineContext {
    pub line_item_id: LineItemId,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub product_id: ProductId,
    pub product_type_id: Option<ProductTypeId>,
    pub collection_id: Option<CollectionId>,
    pub currency: CurrencyCode,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    /// This line's share of the order's shipping.
    pub shipping_share: Decimal,
}

impl LineContext {
    pub fn for_item(
        order_id: OrderId,
        seller_id: SellerId,
        currency: CurrencyCode,
        item: &LineItem,
        shipping_share: Decimal,
    ) -> Self {
        Self {
            line_item_id: item.id,
            order_id,
            seller_id,
            product_id: item.product_id.clone(),
            product_type_id: item.product_type_id.clone(),
            collection_id: item.collection_id.clone(),
            currency,
            subtotal: item.subtotal(),
            tax_total: item.tax_total(),
            shipping_share,
        }
    }

    /// The reference id this line exposes for a given rule level.
    pub fn reference_id(&self, reference: RuleReference) -> Option<String> {
        match reference {
            RuleReference::Site => None,
            RuleReference::Seller => Some(self.seller_id.to_string()),
            RuleReference::Product => Some(self.product_id.to_string()),
            RuleReference::ProductType => self.product_type_id.as_ref().map(|t| t.to_string()),
            RuleReference::ProductCollection => {
                self.collection_id.as_ref().map(|c| c.to_string())
            }
        }
    }

    fn matches(&self, rule: &CommissionRule) -> bool {
        match rule.reference {
            RuleReference::Site => rule.reference_id.is_none(),
            reference => {
                rule.reference_id.is_some() && rule.reference_id == self.reference_id(reference)
            }
        }
    }
}

/// The commission taken on one order line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionLine {
    pub id: CommissionLineId,
    pub item_line_id: LineItemId,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub rule_id: CommissionRuleId,
    pub currency_code: CurrencyCode,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
}

impl CommissionLine {
    pub fn amount(&self) -> Money {
        Money::new(self.value, self.currency_code.clone())
    }
}

/// Picks the most specific active rule matching the line.
///
/// Precedence: product, product type, collection, seller, site.
pub fn select_rule<'a>(
    rules: &'a [CommissionRule],
    ctx: &LineContext,
) -> Result<&'a CommissionRule, CommissionError> {
    rules
        .iter()
        .filter(|r| r.is_active && ctx.matches(r))
        .max_by_key(|r| r.reference.specificity())
        .ok_or(CommissionError::NoApplicableRule {
            line_item_id: ctx.line_item_id,
        })
}

/// Computes the commission a rule takes on a line.
pub fn compute_commission(
    rule: &CommissionRule,
    ctx: &LineContext,
) -> Result<Decimal, CommissionError> {
    let rate = &rule.rate;
    match &rate.kind {
        RateKind::Flat { .. } => {
            rate.flat_amount_for(&ctx.currency)
                .ok_or_else(|| CommissionError::CurrencyMismatch {
                    currency: ctx.currency.clone(),
                })
        }
        RateKind::Percentage { percentage_rate } => {
            let mut base = ctx.subtotal;
            if rate.include_tax {
                base += ctx.tax_total;
            }
            if rate.include_shipping {
                base += ctx.shipping_share;
            }
            // Only computed percentages are clamped.
            let mut value = base * *percentage_rate / Decimal::ONE_HUNDRED;
            if let Some(min) = rate.min_for(&ctx.currency) {
                value = value.max(min);
            }
            if let Some(max) = rate.max_for(&ctx.currency) {
                value = value.min(max);
            }
            Ok(value)
        }
    }
}

/// Resolves the rule for a line and produces its commission line.
pub fn resolve(
    rules: &[CommissionRule],
    ctx: &LineContext,
) -> Result<CommissionLine, CommissionError> {
    let rule = select_rule(rules, ctx)?;
    let value = compute_commission(rule, ctx)?;

    Ok(CommissionLine {
        id: CommissionLineId::new(),
        item_line_id: ctx.line_item_id,
        order_id: ctx.order_id,
        seller_id: ctx.seller_id,
        rule_id: rule.id,
        currency_code: ctx.currency.clone(),
        value,
        created_at: Utc::now(),
    })
}

/// Exact sum of an order's commission lines.
pub fn total_commission(
    lines: &[CommissionLine],
    currency: &CurrencyCode,
) -> Result<Money, CommissionError> {
    lines
        .iter()
        .try_fold(Money::zero(currency.clone()), |acc, line| {
            acc.checked_add(&line.amount())
        })
        .map_err(CommissionError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::{CommissionRate, NewCommissionRule};
    use rust_decimal_macros::dec;

    fn ctx(seller: SellerId, subtotal: Decimal) -> LineContext {
        LineContext {
            line_item_id: LineItemId::new(),
            order_id: OrderId::new(),
            seller_id: seller,
            product_id: ProductId::new("prod_1"),
            product_type_id: Some(ProductTypeId::new("type_1")),
            collection_id: Some(CollectionId::new("col_1")),
            currency: CurrencyCode::new("usd"),
            subtotal,
            tax_total: dec!(20),
            shipping_share: dec!(10),
        }
    }

    fn rule(reference: RuleReference, reference_id: Option<&str>, pct: Decimal) -> CommissionRule {
        NewCommissionRule::new(
            format!("{reference}"),
            reference,
            reference_id.map(String::from),
            CommissionRate::percentage(pct),
        )
        .into_rule()
        .unwrap()
    }

    #[test]
    fn most_specific_rule_wins() {
        let seller = SellerId::new();
        let line = ctx(seller, dec!(100));
        let site = rule(RuleReference::Site, None, dec!(10));
        let by_seller = rule(RuleReference::Seller, Some(&seller.to_string()), dec!(8));
        let by_collection = rule(RuleReference::ProductCollection, Some("col_1"), dec!(6));
        let by_type = rule(RuleReference::ProductType, Some("type_1"), dec!(4));
        let by_product = rule(RuleReference::Product, Some("prod_1"), dec!(2));
        let other_product = rule(RuleReference::Product, Some("prod_2"), dec!(1));

        let mut rules = vec![site.clone(), by_seller.clone(), other_product];
        assert_eq!(select_rule(&rules, &line).unwrap().id, by_seller.id);

        rules.push(by_collection.clone());
        assert_eq!(select_rule(&rules, &line).unwrap().id, by_collection.id);

        rules.push(by_type.clone());
        assert_eq!(select_rule(&rules, &line).unwrap().id, by_type.id);

        rules.push(by_product.clone());
        assert_eq!(select_rule(&rules, &line).unwrap().id, by_product.id);

        rules.iter_mut().for_each(|r| {
            if r.reference != RuleReference::Site {
                r.is_active = false;
            }
        });
        assert_eq!(select_rule(&rules, &line).unwrap().id, site.id);
    }

    #[test]
    fn no_rule_is_a_not_found_error() {
        let line = ctx(SellerId::new(), dec!(100));
        let err = select_rule(&[], &line).unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
    }

    #[test]
    fn percentage_with_tax_and_shipping() {
        let line = ctx(SellerId::new(), dec!(100));
        let mut r = rule(RuleReference::Site, None, dec!(10));
        assert_eq!(compute_commission(&r, &line).unwrap(), dec!(10));

        r.rate = r.rate.clone().including_tax();
        assert_eq!(compute_commission(&r, &line).unwrap(), dec!(12));

        r.rate = r.rate.clone().including_shipping();
        assert_eq!(compute_commission(&r, &line).unwrap(), dec!(13));
    }

    #[test]
    fn percentage_is_clamped_to_bounds() {
        let line = ctx(SellerId::new(), dec!(100));
        let mut r = rule(RuleReference::Site, None, dec!(10));
        r.rate = r.rate.clone().with_max(Money::new(dec!(7.50), "usd"));
        assert_eq!(compute_commission(&r, &line).unwrap(), dec!(7.50));

        let small = ctx(SellerId::new(), dec!(1));
        r.rate = r.rate.clone().with_min(Money::new(dec!(0.50), "usd"));
        assert_eq!(compute_commission(&r, &small).unwrap(), dec!(0.50));

        // Bounds in another currency are ignored.
        let mut eur = rule(RuleReference::Site, None, dec!(10));
        eur.rate = eur.rate.clone().with_max(Money::new(dec!(1), "eur"));
        assert_eq!(compute_commission(&eur, &line).unwrap(), dec!(10));
    }

    #[test]
    fn flat_rate_ignores_bounds() {
        let line = ctx(SellerId::new(), dec!(100));
        let flat = NewCommissionRule::site(
            "flat",
            CommissionRate::flat(vec![Money::new(dec!(3), "usd")])
                .with_min(Money::new(dec!(5), "usd"))
                .with_max(Money::new(dec!(10), "usd")),
        )
        .into_rule()
        .unwrap();
        assert_eq!(compute_commission(&flat, &line).unwrap(), dec!(3));

        let capped = NewCommissionRule::site(
            "flat",
            CommissionRate::flat(vec![Money::new(dec!(12), "usd")])
                .with_max(Money::new(dec!(10), "usd")),
        )
        .into_rule()
        .unwrap();
        assert_eq!(compute_commission(&capped, &line).unwrap(), dec!(12));
    }

    #[test]
    fn flat_rate_requires_matching_currency() {
        let line = ctx(SellerId::new(), dec!(100));
        let flat = NewCommissionRule::site(
            "flat",
            CommissionRate::flat(vec![Money::new(dec!(3), "usd")]),
        )
        .into_rule()
        .unwrap();
        assert_eq!(compute_commission(&flat, &line).unwrap(), dec!(3));

        let mut eur_line = line.clone();
        eur_line.currency = CurrencyCode::new("eur");
        assert!(matches!(
            compute_commission(&flat, &eur_line),
            Err(CommissionError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn total_is_exact_sum_of_lines() {
        let rules = vec![rule(RuleReference::Site, None, dec!(7.5))];
        let seller = SellerId::new();
        let lines: Vec<CommissionLine> = [dec!(33.33), dec!(0.01), dec!(19.99)]
            .into_iter()
            .map(|s| resolve(&rules, &ctx(seller, s)).unwrap())
            .collect();

        let total = total_commission(&lines, &CurrencyCode::new("usd")).unwrap();
        assert_eq!(total.amount, dec!(3.99975));
        assert_eq!(lines[0].rule_id, rules[0].id);
    }
}
