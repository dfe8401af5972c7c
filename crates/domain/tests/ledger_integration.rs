//! Integration tests across the domain services.
//!
//! These tests drive the split payment and payout account services through
//! the in-memory event store, the way the saga workflows use them.

use common::{ErrorKind, Money, OrderId, PaymentCollectionId, PayoutId, PayoutReversalId, SellerId};
use domain::commission::{self, CommissionRate, LineContext, NewCommissionRule, RuleReference};
use domain::payout::BalanceTransaction;
use domain::{
    AccountStatus, Aggregate, Cart, LineItem, PayoutAccountService, ShippingMethod,
    SplitPaymentService, SplitPaymentStatus, WebhookAction, split_cart, verify_totals,
};
use event_store::{EventStore, InMemoryEventStore, Version};
use rust_decimal_macros::dec;
use serde_json::json;

fn usd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, "usd")
}

mod split_and_commission {
    use super::*;

    #[test]
    fn two_seller_cart_yields_ten_percent_commission() {
        let seller_a = SellerId::new();
        let seller_b = SellerId::new();
        let cart = Cart::new("usd")
            .with_item(LineItem::new(seller_a, "prod_a", "Lamp", 1, dec!(100)))
            .with_item(LineItem::new(seller_b, "prod_b", "Mug", 2, dec!(25)));

        let split = split_cart(&cart).unwrap();
        assert_eq!(split.drafts.len(), 2);

        let now = chrono::Utc::now();
        let order_set = split.to_order_set(&cart, 1, now);
        let orders: Vec<_> = split
            .drafts
            .iter()
            .enumerate()
            .map(|(i, d)| d.to_order(&cart, order_set.id, i as u64 + 1, now))
            .collect();
        verify_totals(&cart, &order_set, &orders).unwrap();

        let rules = vec![
            NewCommissionRule::site("Default", CommissionRate::percentage(dec!(10)))
                .into_rule()
                .unwrap(),
        ];
        let values: Vec<_> = orders
            .iter()
            .map(|order| {
                let lines: Vec<_> = order
                    .items
                    .iter()
                    .map(|item| {
                        let ctx = LineContext::for_item(
                            order.id,
                            order.seller_id,
                            order.currency.clone(),
                            item,
                            dec!(0),
                        );
                        commission::resolve(&rules, &ctx).unwrap()
                    })
                    .collect();
                commission::total_commission(&lines, &order.currency)
                    .unwrap()
                    .amount
            })
            .collect();
        assert_eq!(values, vec![dec!(10), dec!(5)]);
    }

    #[test]
    fn seller_rule_overrides_site_rule_and_shipping_follows_seller() {
        let seller = SellerId::new();
        let cart = Cart::new("usd")
            .with_item(LineItem::new(seller, "prod_a", "Lamp", 1, dec!(80)))
            .with_item(LineItem::new(seller, "prod_b", "Shade", 1, dec!(20)))
            .with_shipping(ShippingMethod::new(Some(seller), "Express", dec!(10)));

        let split = split_cart(&cart).unwrap();
        let draft = &split.drafts[0];
        assert_eq!(draft.shipping_methods.len(), 1);

        let rules = vec![
            NewCommissionRule::site("Default", CommissionRate::percentage(dec!(10)))
                .into_rule()
                .unwrap(),
            NewCommissionRule::new(
                "Seller deal",
                RuleReference::Seller,
                Some(seller.to_string()),
                CommissionRate::percentage(dec!(5)).including_shipping(),
            )
            .into_rule()
            .unwrap(),
        ];

        let shares = domain::order_set::allocate_proportionally(
            dec!(10),
            &draft.items.iter().map(LineItem::subtotal).collect::<Vec<_>>(),
        );
        let total: rust_decimal::Decimal = draft
            .items
            .iter()
            .zip(shares)
            .map(|(item, share)| {
                let ctx = LineContext::for_item(draft.order_id, seller, "usd".into(), item, share);
                commission::resolve(&rules, &ctx).unwrap().value
            })
            .sum();

        // 5 % of (100 + 10 shipping)
        assert_eq!(total, dec!(5.5));
    }
}

mod split_payment_ledger {
    use super::*;

    #[tokio::test]
    async fn capture_is_idempotent_and_refund_is_bounded() {
        let service = SplitPaymentService::new(InMemoryEventStore::new());
        let order = OrderId::new();
        let id = service
            .create(order, SellerId::new(), PaymentCollectionId::new(), usd(dec!(100)))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        service.capture(id, "pay_1").await.unwrap();
        service.capture(id, "pay_1").await.unwrap();
        let payment = service.get(id).await.unwrap().unwrap();
        assert_eq!(payment.captured().amount, dec!(100));

        let err = service.refund(id, "re_1", &usd(dec!(100.01))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        service.refund(id, "re_1", &usd(dec!(20))).await.unwrap();
        service.refund(id, "re_1", &usd(dec!(20))).await.unwrap();
        let payment = service.get(id).await.unwrap().unwrap();
        assert_eq!(payment.refunded().amount, dec!(20));
        assert!(payment.is_partially_refunded());

        service.revert_refund(id, "re_1").await.unwrap();
        let payment = service.get(id).await.unwrap().unwrap();
        assert_eq!(payment.refunded().amount, dec!(0));
        assert_eq!(payment.status(), SplitPaymentStatus::Captured);
    }

    #[tokio::test]
    async fn events_are_persisted_with_sequential_versions() {
        let store = InMemoryEventStore::new();
        let service = SplitPaymentService::new(store.clone());
        let id = service
            .create(OrderId::new(), SellerId::new(), PaymentCollectionId::new(), usd(dec!(5)))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        service.capture(id, "pay_1").await.unwrap();

        let events = store.get_events_for_aggregate(id).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["SplitPaymentCreated", "SplitPaymentCaptured"]);
        assert_eq!(events[1].version, Version::new(2));
    }
}

mod payout_accounts {
    use super::*;

    #[tokio::test]
    async fn refund_reversal_debits_the_seller() {
        let service = PayoutAccountService::new(InMemoryEventStore::new());
        let seller = SellerId::new();
        service
            .create_account(seller, "acct_a", json!({}), json!({}))
            .await
            .unwrap();
        service
            .handle_webhook("acct_a", WebhookAction::AccountAuthorized, json!({}))
            .await
            .unwrap();

        service
            .apply_transactions(
                seller,
                &[
                    BalanceTransaction::capture("capture:o1", usd(dec!(100))),
                    BalanceTransaction::commission("commission:o1", usd(dec!(10))),
                ],
            )
            .await
            .unwrap();

        let payout = PayoutId::new();
        service
            .create_payout(seller, payout, Some(OrderId::new()), &usd(dec!(90)), "tr_1")
            .await
            .unwrap();

        let reversal = PayoutReversalId::new();
        let result = service
            .create_reversal(seller, payout, reversal, &usd(dec!(20)), "trr_1")
            .await
            .unwrap();

        let account = result.aggregate;
        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.balance(&"usd".into()).total, dec!(70));
        assert_eq!(account.payout(payout).unwrap().reversed_total(), dec!(20));
        account.reconcile().unwrap();

        service.void_reversal(seller, payout, reversal).await.unwrap();
        let account = service.find_by_seller(seller).await.unwrap().unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(90));
    }

    #[tokio::test]
    async fn disabled_account_cannot_be_paid_out() {
        let service = PayoutAccountService::new(InMemoryEventStore::new());
        let seller = SellerId::new();
        let id = service
            .create_account(seller, "acct_b", json!({}), json!({}))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        service.activate(id, json!({})).await.unwrap();
        service.disable(id, "fraud review").await.unwrap();

        let err = service
            .create_payout(seller, PayoutId::new(), None, &usd(dec!(1)), "tr_1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
