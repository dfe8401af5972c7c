//! Order sets: one customer checkout split into per-seller orders.

mod model;
mod split;

pub use model::{Order, OrderSet, PaymentStatus};
pub use split::{CartSplit, SellerOrderDraft, allocate_proportionally, split_cart, verify_totals};

use common::{ErrorKind, LineItemId, OrderId, OrderSetId, SellerId, ShippingMethodId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while splitting a cart or handling orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The cart has no line items.
    #[error("Cart has no items")]
    NoItems,

    /// A line item was added without a seller.
    #[error("Line item {line_item_id} has no seller")]
    MissingSeller { line_item_id: LineItemId },

    #[error("Line item {line_item_id} has invalid quantity or price")]
    InvalidLineItem { line_item_id: LineItemId },

    /// A seller shipping method for a seller with nothing in the cart.
    #[error("Shipping method {shipping_method_id} belongs to seller {seller_id}, who has no items")]
    ShippingSellerNotInCart {
        shipping_method_id: ShippingMethodId,
        seller_id: SellerId,
    },

    /// The child orders do not add up to the cart.
    #[error("Order totals {actual} do not match cart total {expected}")]
    TotalsMismatch { expected: Decimal, actual: Decimal },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order set not found: {0}")]
    OrderSetNotFound(OrderSetId),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NoItems
            | OrderError::MissingSeller { .. }
            | OrderError::InvalidLineItem { .. }
            | OrderError::ShippingSellerNotInCart { .. } => ErrorKind::Validation,
            OrderError::TotalsMismatch { .. } => ErrorKind::Internal,
            OrderError::OrderNotFound(_) | OrderError::OrderSetNotFound(_) => ErrorKind::NotFound,
        }
    }
}
