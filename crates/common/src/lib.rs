//! Shared types for the marketplace workspace.

pub mod error;
pub mod money;
pub mod types;

pub use error::ErrorKind;
pub use money::{CurrencyCode, Money, MoneyError};
pub use types::{
    AggregateId, CartId, CollectionId, CommissionLineId, CommissionRuleId, CustomerId, LineItemId,
    OrderId, OrderSetId, PaymentCollectionId, PayoutId, PayoutReversalId, ProductId,
    ProductTypeId, SalesChannelId, SellerId, ShippingMethodId,
};
