//! Splits a completed cart into an order set and one order per seller.
//!
//! Steps: create the order-set header, create each seller order (reserving
//! its stock), then open one split payment per order. A failing seller order
//! compensates the orders created before it and the header.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, OrderId, OrderSetId};
use domain::{
    Cart, CartSplit, DomainError, Order, OrderSet, SellerOrderDraft, SplitOrderPayment,
    SplitPaymentService, split_cart, verify_totals,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::{InventoryService, OrderRepository, ReservationItem};
use crate::step::{Step, Undo, Workflow};

pub const WORKFLOW: &str = "place_order_set";

/// Hook fired with the final [`PlaceOrderSet`] once the order set is placed.
pub const ORDER_SET_PLACED: &str = "order_set_placed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderSet {
    pub cart: Cart,
    pub split: CartSplit,
    pub order_set: Option<OrderSet>,
    pub orders: Vec<Order>,
    pub split_payment_ids: Vec<AggregateId>,
}

impl PlaceOrderSet {
    /// Validates the cart and plans the split without persisting anything.
    pub fn plan(cart: Cart) -> Result<Self, SagaError> {
        let split = split_cart(&cart).map_err(DomainError::from)?;

        let now = Utc::now();
        let preview: Vec<Order> = split
            .drafts
            .iter()
            .map(|d| d.to_order(&cart, split.order_set_id, 0, now))
            .collect();
        verify_totals(&cart, &split.to_order_set(&cart, 0, now), &preview)
            .map_err(DomainError::from)?;

        Ok(Self {
            cart,
            split,
            order_set: None,
            orders: Vec::new(),
            split_payment_ids: Vec::new(),
        })
    }

    pub fn order_set_id(&self) -> OrderSetId {
        self.split.order_set_id
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.orders.iter().map(|o| o.id).collect()
    }
}

/// Builds the workflow for a split with `seller_count` seller orders.
///
/// Seller-order undos work from their token alone, so a single seller step
/// is enough to recover any run.
pub fn workflow<S: EventStore + 'static>(
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
    split_payments: Arc<SplitPaymentService<S>>,
    seller_count: usize,
) -> Workflow<PlaceOrderSet> {
    let mut workflow = Workflow::new(WORKFLOW).step(CreateOrderSet {
        orders: Arc::clone(&orders),
    });
    for index in 0..seller_count.max(1) {
        workflow = workflow.step(CreateSellerOrder {
            index,
            orders: Arc::clone(&orders),
            inventory: Arc::clone(&inventory),
        });
    }
    workflow
        .step(CreateSplitPayments { split_payments })
        .hook(ORDER_SET_PLACED)
}

struct CreateOrderSet {
    orders: Arc<dyn OrderRepository>,
}

#[async_trait]
impl Step<PlaceOrderSet> for CreateOrderSet {
    fn name(&self) -> &'static str {
        "create_order_set"
    }

    async fn execute(&self, ctx: &mut PlaceOrderSet) -> Result<Undo, SagaError> {
        let order_set = match &ctx.order_set {
            Some(order_set) => order_set.clone(),
            None => {
                let display_id = self.orders.next_display_id().await?;
                let order_set = ctx.split.to_order_set(&ctx.cart, display_id, Utc::now());
                ctx.order_set = Some(order_set.clone());
                order_set
            }
        };

        self.orders.insert_order_set(order_set.clone()).await?;
        tracing::info!(
            order_set_id = %order_set.id,
            display_id = order_set.display_id,
            sellers = order_set.order_ids.len(),
            "order set created"
        );
        Undo::new(&order_set.id)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let id: OrderSetId = undo.decode()?;
        self.orders.delete_order_set(id).await?;
        tracing::info!(order_set_id = %id, "order set deleted");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SellerOrderUndo {
    order_id: OrderId,
    reservation_id: String,
}

struct CreateSellerOrder {
    index: usize,
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
}

impl CreateSellerOrder {
    async fn persist(
        &self,
        ctx: &mut PlaceOrderSet,
        draft: &SellerOrderDraft,
    ) -> Result<Order, SagaError> {
        let order = match ctx.orders.iter().find(|o| o.id == draft.order_id) {
            Some(order) => order.clone(),
            None => {
                let display_id = self.orders.next_display_id().await?;
                let order =
                    draft.to_order(&ctx.cart, ctx.split.order_set_id, display_id, Utc::now());
                ctx.orders.push(order.clone());
                order
            }
        };
        self.orders.insert_order(order.clone()).await?;
        Ok(order)
    }
}

#[async_trait]
impl Step<PlaceOrderSet> for CreateSellerOrder {
    fn name(&self) -> &'static str {
        "create_seller_order"
    }

    async fn execute(&self, ctx: &mut PlaceOrderSet) -> Result<Undo, SagaError> {
        let draft = ctx
            .split
            .drafts
            .get(self.index)
            .cloned()
            .ok_or_else(|| SagaError::NotFound(format!("seller order draft {}", self.index)))?;

        let items = draft
            .items
            .iter()
            .map(|item| ReservationItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            })
            .collect();
        let reservation = self.inventory.reserve(draft.order_id, items).await?;

        let order = match self.persist(ctx, &draft).await {
            Ok(order) => order,
            Err(error) => {
                // The step did not complete, so no undo will release this.
                if let Err(release_error) =
                    self.inventory.release(&reservation.reservation_id).await
                {
                    tracing::warn!(
                        reservation_id = %reservation.reservation_id,
                        error = %release_error,
                        "failed to release reservation of unsaved order"
                    );
                }
                return Err(error);
            }
        };

        tracing::info!(
            order_id = %order.id,
            seller_id = %order.seller_id,
            total = %order.total(),
            "seller order created"
        );
        Undo::new(&SellerOrderUndo {
            order_id: order.id,
            reservation_id: reservation.reservation_id,
        })
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let undo: SellerOrderUndo = undo.decode()?;
        self.orders.delete_order(undo.order_id).await?;
        self.inventory.release(&undo.reservation_id).await?;
        tracing::info!(order_id = %undo.order_id, "seller order deleted");
        Ok(())
    }
}

struct CreateSplitPayments<S: EventStore> {
    split_payments: Arc<SplitPaymentService<S>>,
}

impl<S: EventStore> CreateSplitPayments<S> {
    async fn cancel_all(&self, ids: &[AggregateId]) {
        for id in ids {
            if let Err(error) = self.split_payments.cancel(*id, "order set compensated").await {
                tracing::warn!(split_payment_id = %id, %error, "failed to cancel split payment");
            }
        }
    }
}

#[async_trait]
impl<S: EventStore + 'static> Step<PlaceOrderSet> for CreateSplitPayments<S> {
    fn name(&self) -> &'static str {
        "create_split_payments"
    }

    async fn execute(&self, ctx: &mut PlaceOrderSet) -> Result<Undo, SagaError> {
        let payment_collection_id = ctx.cart.payment_collection_id;
        let mut ids = Vec::with_capacity(ctx.orders.len());
        let mut created = Vec::new();

        for order in &ctx.orders {
            let id = SplitOrderPayment::id_for(order.id);
            if self.split_payments.get(id).await?.is_none() {
                let result = self
                    .split_payments
                    .create(
                        order.id,
                        order.seller_id,
                        payment_collection_id,
                        order.total_money(),
                    )
                    .await;
                if let Err(error) = result {
                    self.cancel_all(&created).await;
                    return Err(error.into());
                }
                created.push(id);
            }
            ids.push(id);
        }

        ctx.split_payment_ids = ids.clone();
        Undo::new(&ids)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let ids: Vec<AggregateId> = undo.decode()?;
        for id in ids {
            match self.split_payments.cancel(id, "order set compensated").await {
                Ok(_) | Err(DomainError::AggregateNotFound { .. }) => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }
}
