//! External collaborator traits and in-memory implementations for saga steps.

pub mod cart;
pub mod commission;
pub mod inventory;
pub mod orders;
pub mod payout_provider;

use std::sync::Arc;

pub use cart::{CartService, InMemoryCartService};
pub use commission::{CommissionStore, InMemoryCommissionStore};
pub use inventory::{
    InMemoryInventoryService, InventoryService, ReservationItem, ReservationResult,
};
pub use orders::{InMemoryOrderRepository, OrderRepository};
pub use payout_provider::{InMemoryPayoutProvider, PayoutProvider, ProviderAccount};

/// The collaborators the marketplace workflows are wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub carts: Arc<dyn CartService>,
    pub orders: Arc<dyn OrderRepository>,
    pub inventory: Arc<dyn InventoryService>,
    pub commissions: Arc<dyn CommissionStore>,
    pub payout_provider: Arc<dyn PayoutProvider>,
}

impl Collaborators {
    /// Fresh in-memory collaborators.
    pub fn in_memory() -> Self {
        Self {
            carts: Arc::new(InMemoryCartService::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            inventory: Arc::new(InMemoryInventoryService::new()),
            commissions: Arc::new(InMemoryCommissionStore::new()),
            payout_provider: Arc::new(InMemoryPayoutProvider::new()),
        }
    }
}
