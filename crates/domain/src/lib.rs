//! Domain layer for the marketplace core.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait for event-sourced entities
//! - DomainEvent trait for domain events
//! - CommandHandler for load, decide and append with optimistic concurrency
//! - Order-set splitting of multi-seller carts
//! - Commission rule resolution and computation
//! - Split payment and payout account aggregates

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod commission;
pub mod error;
pub mod order_set;
pub mod payout;
pub mod split_payment;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{Address, Cart, LineItem, ShippingMethod, TaxLine};
pub use command::{CommandHandler, CommandResult};
pub use commission::{
    CommissionError, CommissionLine, CommissionRate, CommissionRule, LineContext,
    NewCommissionRule, RateKind, RuleReference, ensure_no_active_duplicate, resolve,
    total_commission,
};
pub use error::DomainError;
pub use order_set::{
    CartSplit, Order, OrderError, OrderSet, PaymentStatus, SellerOrderDraft,
    allocate_proportionally, split_cart, verify_totals,
};
pub use payout::{
    AccountStatus, BalanceTransaction, Onboarding, Payout, PayoutAccount, PayoutAccountService,
    PayoutBalance, PayoutError, PayoutReversal, WebhookAction,
};
pub use split_payment::{
    SplitOrderPayment, SplitPaymentError, SplitPaymentService, SplitPaymentStatus,
};
