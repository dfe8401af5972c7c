//! Saga orchestration for the marketplace core.
//!
//! A [`Workflow`] is an ordered list of compensable [`Step`]s. The
//! [`SagaRunner`] executes it once per idempotency key, persisting progress
//! as [`SagaEvent`]s, and compensates completed steps in reverse order when a
//! step fails.
//!
//! The marketplace workflows are:
//! 1. Place order set: split a cart into per-seller orders and split payments
//! 2. Finalize commission: compute and record commission lines of an order
//! 3. Capture payment: capture split payments and credit seller balances
//! 4. Refund: refund a split payment and reverse the seller's payout
//! 5. Payouts: create accounts, start onboarding, pay sellers out
//!
//! [`Marketplace`] wires them to their collaborators, and [`EventBus`] routes
//! inbound events to it.

pub mod aggregate;
pub mod bus;
pub mod error;
pub mod events;
pub mod hooks;
pub mod marketplace;
pub mod runner;
pub mod services;
pub mod state;
pub mod step;
pub mod workflows;

pub use aggregate::{CompletedStep, SagaInstance};
pub use bus::{EventBus, EventBusBuilder, MarketplaceEvent};
pub use error::SagaError;
pub use events::SagaEvent;
pub use hooks::{HookRegistry, HookRegistryBuilder};
pub use marketplace::{Marketplace, SUBSCRIPTIONS};
pub use runner::{RunOutcome, SagaRunner};
pub use services::{
    CartService, Collaborators, CommissionStore, InMemoryCartService, InMemoryCommissionStore,
    InMemoryInventoryService, InMemoryOrderRepository, InMemoryPayoutProvider, InventoryService,
    OrderRepository, PayoutProvider, ProviderAccount, ReservationItem, ReservationResult,
};
pub use state::SagaState;
pub use step::{RetryPolicy, Step, Undo, Workflow};
