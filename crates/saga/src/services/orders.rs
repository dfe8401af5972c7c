//! Order persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, OrderId, OrderSetId, SellerId};
use domain::{Order, OrderSet, PaymentStatus};
use parking_lot::RwLock;

use crate::error::SagaError;

/// Persistence for order sets and their seller orders.
///
/// Inserts overwrite a record with the same id and deletes ignore unknown
/// ids, so both are safe to repeat from retries and compensations.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Next human-facing display id, shared by order sets and orders.
    async fn next_display_id(&self) -> Result<u64, SagaError>;

    async fn insert_order_set(&self, order_set: OrderSet) -> Result<(), SagaError>;

    async fn delete_order_set(&self, id: OrderSetId) -> Result<(), SagaError>;

    async fn insert_order(&self, order: Order) -> Result<(), SagaError>;

    async fn delete_order(&self, id: OrderId) -> Result<(), SagaError>;

    async fn get_order_set(&self, id: OrderSetId) -> Result<Option<OrderSet>, SagaError>;

    async fn find_order_set_by_cart(&self, cart_id: CartId)
    -> Result<Option<OrderSet>, SagaError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, SagaError>;

    /// Orders of an order set, in display id order.
    async fn orders_for_set(&self, order_set_id: OrderSetId) -> Result<Vec<Order>, SagaError>;

    /// Sets an order's payment status and returns the previous one.
    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<PaymentStatus, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    order_sets: HashMap<OrderSetId, OrderSet>,
    orders: HashMap<OrderId, Order>,
    last_display_id: u64,
    fail_insert_for: HashSet<SellerId>,
}

/// In-memory order repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes inserts of the seller's orders fail with a transient error.
    pub fn set_fail_on_insert_order(&self, seller_id: SellerId, fail: bool) {
        let mut state = self.state.write();
        if fail {
            state.fail_insert_for.insert(seller_id);
        } else {
            state.fail_insert_for.remove(&seller_id);
        }
    }

    pub fn order_set_count(&self) -> usize {
        self.state.read().order_sets.len()
    }

    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn next_display_id(&self) -> Result<u64, SagaError> {
        let mut state = self.state.write();
        state.last_display_id += 1;
        Ok(state.last_display_id)
    }

    async fn insert_order_set(&self, order_set: OrderSet) -> Result<(), SagaError> {
        self.state.write().order_sets.insert(order_set.id, order_set);
        Ok(())
    }

    async fn delete_order_set(&self, id: OrderSetId) -> Result<(), SagaError> {
        self.state.write().order_sets.remove(&id);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<(), SagaError> {
        let mut state = self.state.write();
        if state.fail_insert_for.contains(&order.seller_id) {
            return Err(SagaError::transient("orders", "order store unavailable"));
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), SagaError> {
        self.state.write().orders.remove(&id);
        Ok(())
    }

    async fn get_order_set(&self, id: OrderSetId) -> Result<Option<OrderSet>, SagaError> {
        Ok(self.state.read().order_sets.get(&id).cloned())
    }

    async fn find_order_set_by_cart(
        &self,
        cart_id: CartId,
    ) -> Result<Option<OrderSet>, SagaError> {
        Ok(self
            .state
            .read()
            .order_sets
            .values()
            .find(|s| s.cart_id == cart_id)
            .cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, SagaError> {
        Ok(self.state.read().orders.get(&id).cloned())
    }

    async fn orders_for_set(&self, order_set_id: OrderSetId) -> Result<Vec<Order>, SagaError> {
        let mut orders: Vec<Order> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| o.order_set_id == order_set_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.display_id);
        Ok(orders)
    }

    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<PaymentStatus, SagaError> {
        let mut state = self.state.write();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| SagaError::NotFound(format!("order {id}")))?;
        Ok(std::mem::replace(&mut order.payment_status, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Cart, LineItem, split_cart};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_insert_query_and_delete() {
        let repo = InMemoryOrderRepository::new();
        let cart = Cart::new("usd")
            .with_item(LineItem::new(common::SellerId::new(), "p1", "Lamp", 1, dec!(10)));
        let split = split_cart(&cart).unwrap();
        let display_id = repo.next_display_id().await.unwrap();
        let order_set = split.to_order_set(&cart, display_id, Utc::now());
        let order = split.drafts[0].to_order(&cart, order_set.id, 2, Utc::now());

        repo.insert_order_set(order_set.clone()).await.unwrap();
        repo.insert_order(order.clone()).await.unwrap();
        // Repeated inserts overwrite.
        repo.insert_order(order.clone()).await.unwrap();

        assert_eq!(repo.order_count(), 1);
        assert_eq!(
            repo.find_order_set_by_cart(cart.id).await.unwrap().map(|s| s.id),
            Some(order_set.id)
        );
        assert_eq!(repo.orders_for_set(order_set.id).await.unwrap().len(), 1);

        let previous = repo
            .set_payment_status(order.id, PaymentStatus::Captured)
            .await
            .unwrap();
        assert_eq!(previous, PaymentStatus::Authorized);

        repo.delete_order(order.id).await.unwrap();
        repo.delete_order(order.id).await.unwrap();
        repo.delete_order_set(order_set.id).await.unwrap();
        assert_eq!(repo.order_count(), 0);
        assert_eq!(repo.order_set_count(), 0);
        assert!(
            repo.set_payment_status(order.id, PaymentStatus::Captured)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_display_ids_are_sequential() {
        let repo = InMemoryOrderRepository::new();
        assert_eq!(repo.next_display_id().await.unwrap(), 1);
        assert_eq!(repo.next_display_id().await.unwrap(), 2);
    }
}
