//! Inventory service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use parking_lot::RwLock;

use crate::error::SagaError;

/// Result of a successful inventory reservation.
#[derive(Debug, Clone)]
pub struct ReservationResult {
    /// The reservation ID assigned by the inventory service.
    pub reservation_id: String,
}

/// An item to reserve in inventory.
#[derive(Debug, Clone)]
pub struct ReservationItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Trait for inventory management operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves stock for a seller order.
    ///
    /// Reserving again for the same order returns the existing reservation.
    async fn reserve(
        &self,
        order_id: OrderId,
        items: Vec<ReservationItem>,
    ) -> Result<ReservationResult, SagaError>;

    /// Releases a reservation. Unknown ids are ignored.
    async fn release(&self, reservation_id: &str) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    reservations: HashMap<String, (OrderId, Vec<ReservationItem>)>,
    next_id: u32,
    out_of_stock: HashSet<ProductId>,
    transient_failures: u32,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denies every reservation containing `product_id`.
    pub fn set_out_of_stock(&self, product_id: impl Into<ProductId>) {
        self.state.write().out_of_stock.insert(product_id.into());
    }

    pub fn restock(&self, product_id: impl Into<ProductId>) {
        self.state.write().out_of_stock.remove(&product_id.into());
    }

    /// Makes the next `count` reserve calls fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.state.write().transient_failures = count;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().reservations.len()
    }

    pub fn has_reservation(&self, reservation_id: &str) -> bool {
        self.state.read().reservations.contains_key(reservation_id)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: Vec<ReservationItem>,
    ) -> Result<ReservationResult, SagaError> {
        let mut state = self.state.write();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(SagaError::transient("inventory", "inventory service timed out"));
        }
        if let Some(item) = items
            .iter()
            .find(|i| state.out_of_stock.contains(&i.product_id))
        {
            return Err(SagaError::rejected(
                "inventory",
                format!("insufficient stock for product {}", item.product_id),
            ));
        }

        if let Some((id, _)) = state
            .reservations
            .iter()
            .find(|(_, (reserved_for, _))| *reserved_for == order_id)
        {
            return Ok(ReservationResult {
                reservation_id: id.clone(),
            });
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state
            .reservations
            .insert(reservation_id.clone(), (order_id, items));

        Ok(ReservationResult { reservation_id })
    }

    async fn release(&self, reservation_id: &str) -> Result<(), SagaError> {
        self.state.write().reservations.remove(reservation_id);
        Ok(())
    }
}
