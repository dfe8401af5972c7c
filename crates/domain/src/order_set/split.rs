use chrono::{DateTime, Utc};
use common::{OrderId, OrderSetId, SellerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Order, OrderError, OrderSet, PaymentStatus};
use crate::cart::{Cart, LineItem, ShippingMethod};

/// The items and shipping of one seller, before the order is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerOrderDraft {
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub items: Vec<LineItem>,
    pub shipping_methods: Vec<ShippingMethod>,
}

impl SellerOrderDraft {
    /// Materializes the seller order, copying addresses and contact details
    /// from the cart.
    pub fn to_order(
        &self,
        cart: &Cart,
        order_set_id: OrderSetId,
        display_id: u64,
        now: DateTime<Utc>,
    ) -> Order {
        Order {
            id: self.order_id,
            display_id,
            order_set_id,
            seller_id: self.seller_id,
            customer_id: cart.customer_id,
            sales_channel_id: cart.sales_channel_id,
            currency: cart.currency.clone(),
            email: cart.email.clone(),
            shipping_address: cart.shipping_address.clone(),
            billing_address: cart.billing_address.clone(),
            items: self.items.clone(),
            shipping_methods: self.shipping_methods.clone(),
            payment_status: PaymentStatus::Authorized,
            created_at: now,
        }
    }
}

/// A validated cart grouped by seller, with ids allocated up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSplit {
    pub order_set_id: OrderSetId,
    pub drafts: Vec<SellerOrderDraft>,
    pub platform_shipping: Vec<ShippingMethod>,
}

impl CartSplit {
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.drafts.iter().map(|d| d.order_id).collect()
    }

    pub fn to_order_set(&self, cart: &Cart, display_id: u64, now: DateTime<Utc>) -> OrderSet {
        OrderSet {
            id: self.order_set_id,
            display_id,
            cart_id: cart.id,
            customer_id: cart.customer_id,
            sales_channel_id: cart.sales_channel_id,
            payment_collection_id: cart.payment_collection_id,
            currency: cart.currency.clone(),
            order_ids: self.order_ids(),
            platform_shipping: self.platform_shipping.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Groups a cart's line items and shipping methods by seller.
///
/// Sellers keep the order in which they first appear in the cart. A single
/// seller still yields a split of one. Shipping methods without a seller stay
/// on the order set as platform-level shipping.
pub fn split_cart(cart: &Cart) -> Result<CartSplit, OrderError> {
    if cart.items.is_empty() {
        return Err(OrderError::NoItems);
    }

    let mut drafts: Vec<SellerOrderDraft> = Vec::new();
    for item in &cart.items {
        let seller_id = item.seller_id.ok_or(OrderError::MissingSeller {
            line_item_id: item.id,
        })?;
        if item.quantity == 0 || item.unit_price.is_sign_negative() {
            return Err(OrderError::InvalidLineItem {
                line_item_id: item.id,
            });
        }

        match drafts.iter_mut().find(|d| d.seller_id == seller_id) {
            Some(draft) => draft.items.push(item.clone()),
            None => drafts.push(SellerOrderDraft {
                order_id: OrderId::new(),
                seller_id,
                items: vec![item.clone()],
                shipping_methods: Vec::new(),
            }),
        }
    }

    let mut platform_shipping = Vec::new();
    for method in &cart.shipping_methods {
        match method.seller_id {
            Some(seller_id) => {
                let draft = drafts
                    .iter_mut()
                    .find(|d| d.seller_id == seller_id)
                    .ok_or(OrderError::ShippingSellerNotInCart {
                        shipping_method_id: method.id,
                        seller_id,
                    })?;
                draft.shipping_methods.push(method.clone());
            }
            None => platform_shipping.push(method.clone()),
        }
    }

    Ok(CartSplit {
        order_set_id: OrderSetId::new(),
        drafts,
        platform_shipping,
    })
}

/// Checks that the seller orders plus platform shipping add up to the cart.
pub fn verify_totals(cart: &Cart, order_set: &OrderSet, orders: &[Order]) -> Result<(), OrderError> {
    let expected = cart.total();
    let actual =
        orders.iter().map(Order::total).sum::<Decimal>() + order_set.platform_shipping_total();
    if expected != actual {
        return Err(OrderError::TotalsMismatch { expected, actual });
    }
    Ok(())
}

/// Splits `total` across `weights` proportionally.
///
/// Shares are rounded to the scale of `total` (at least two places) and the
/// last share absorbs the rounding remainder, so the result always sums to
/// `total` exactly. With no positive weight, everything goes to the last slot.
pub fn allocate_proportionally(total: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let Some(last) = weights.len().checked_sub(1) else {
        return Vec::new();
    };
    let weight_sum: Decimal = weights.iter().copied().sum();
    let scale = total.scale().max(2);

    let mut shares = vec![Decimal::ZERO; weights.len()];
    if weight_sum <= Decimal::ZERO {
        shares[last] = total;
        return shares;
    }

    let mut allocated = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate().take(last) {
        let share = (total * *weight / weight_sum).round_dp(scale);
        shares[i] = share;
        allocated += share;
    }
    shares[last] = total - allocated;
    shares
}
