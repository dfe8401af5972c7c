use chrono::{DateTime, Utc};
use common::{
    CartId, CurrencyCode, CustomerId, Money, OrderId, OrderSetId, PaymentCollectionId,
    SalesChannelId, SellerId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{Address, LineItem, ShippingMethod};

/// Payment status of a seller order, driven by its split payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Authorized,
    Captured,
    PartiallyRefunded,
    Refunded,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The header of a split checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSet {
    pub id: OrderSetId,
    pub display_id: u64,
    pub cart_id: CartId,
    pub customer_id: Option<CustomerId>,
    pub sales_channel_id: SalesChannelId,
    pub payment_collection_id: PaymentCollectionId,
    pub currency: CurrencyCode,
    pub order_ids: Vec<OrderId>,
    /// Shipping not owned by any seller.
    pub platform_shipping: Vec<ShippingMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSet {
    pub fn platform_shipping_total(&self) -> Decimal {
        self.platform_shipping.iter().map(ShippingMethod::total).sum()
    }
}

/// One seller's part of an order set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub display_id: u64,
    pub order_set_id: OrderSetId,
    pub seller_id: SellerId,
    pub customer_id: Option<CustomerId>,
    pub sales_channel_id: SalesChannelId,
    pub currency: CurrencyCode,
    pub email: Option<String>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub items: Vec<LineItem>,
    pub shipping_methods: Vec<ShippingMethod>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn item_subtotal(&self) -> Decimal {
        self.items.iter().map(LineItem::subtotal).sum()
    }

    pub fn tax_total(&self) -> Decimal {
        self.items.iter().map(LineItem::tax_total).sum::<Decimal>()
            + self
                .shipping_methods
                .iter()
                .map(ShippingMethod::tax_total)
                .sum::<Decimal>()
    }

    /// Shipping before tax.
    pub fn shipping_subtotal(&self) -> Decimal {
        self.shipping_methods.iter().map(|s| s.amount).sum()
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::total).sum::<Decimal>()
            + self
                .shipping_methods
                .iter()
                .map(ShippingMethod::total)
                .sum::<Decimal>()
    }

    pub fn total_money(&self) -> Money {
        Money::new(self.total(), self.currency.clone())
    }

    pub fn item(&self, id: common::LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == id)
    }
}
