//! Computes and records the commission lines of a seller order, then debits
//! the seller's balance if the order's payment was already credited.

use std::sync::Arc;

use async_trait::async_trait;
use common::{CommissionLineId, Money, OrderId, SellerId};
use domain::{
    BalanceTransaction, CommissionLine, DomainError, LineContext, LineItem, PayoutAccountService,
    SplitOrderPayment, allocate_proportionally, resolve, total_commission,
};
use event_store::EventStore;
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::{CommissionStore, OrderRepository};
use crate::step::{Step, Undo, Workflow};
use crate::workflows::ledger;

pub const WORKFLOW: &str = "finalize_commission";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeCommission {
    pub order_id: OrderId,
    pub lines: Vec<CommissionLine>,
    /// Sum of `lines`, set once the lines are recorded.
    pub total: Option<Money>,
}

impl FinalizeCommission {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            lines: Vec::new(),
            total: None,
        }
    }
}

pub fn workflow<S: EventStore + 'static>(
    orders: Arc<dyn OrderRepository>,
    commissions: Arc<dyn CommissionStore>,
    payouts: Arc<PayoutAccountService<S>>,
) -> Workflow<FinalizeCommission> {
    Workflow::new(WORKFLOW)
        .step(CreateCommissionLines {
            orders,
            commissions,
        })
        .step(DebitSellerCommission { payouts })
}

fn commission_error(error: domain::CommissionError) -> SagaError {
    SagaError::Domain(DomainError::Commission(error))
}

struct CreateCommissionLines {
    orders: Arc<dyn OrderRepository>,
    commissions: Arc<dyn CommissionStore>,
}

#[async_trait]
impl Step<FinalizeCommission> for CreateCommissionLines {
    fn name(&self) -> &'static str {
        "create_commission_lines"
    }

    async fn execute(&self, ctx: &mut FinalizeCommission) -> Result<Undo, SagaError> {
        let order = self
            .orders
            .get_order(ctx.order_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("order {}", ctx.order_id)))?;

        let subtotals: Vec<Decimal> = order.items.iter().map(LineItem::subtotal).collect();
        let shipping_shares = allocate_proportionally(order.shipping_subtotal(), &subtotals);
        let contexts: Vec<LineContext> = order
            .items
            .iter()
            .zip(shipping_shares)
            .map(|(item, share)| {
                LineContext::for_item(order.id, order.seller_id, order.currency.clone(), item, share)
            })
            .collect();

        // Lines are independent; rules are fetched and resolved concurrently.
        let lines = try_join_all(contexts.into_iter().map(|line| {
            let commissions = Arc::clone(&self.commissions);
            async move {
                let rules = commissions.rules_for_line(&line).await?;
                resolve(&rules, &line).map_err(commission_error)
            }
        }))
        .await?;

        let total = total_commission(&lines, &order.currency).map_err(commission_error)?;
        self.commissions.insert_lines(lines.clone()).await?;

        metrics::counter!("commission_lines_created").increment(lines.len() as u64);
        tracing::info!(order_id = %order.id, lines = lines.len(), %total, "commission finalized");

        let ids: Vec<CommissionLineId> = lines.iter().map(|l| l.id).collect();
        ctx.lines = lines;
        ctx.total = Some(total);
        Undo::new(&ids)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let ids: Vec<CommissionLineId> = undo.decode()?;
        self.commissions.delete_lines(&ids).await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DebitUndo {
    seller_id: SellerId,
    transaction_ids: Vec<String>,
}

struct DebitSellerCommission<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<FinalizeCommission> for DebitSellerCommission<S> {
    fn name(&self) -> &'static str {
        "debit_seller_commission"
    }

    async fn execute(&self, ctx: &mut FinalizeCommission) -> Result<Undo, SagaError> {
        let (Some(total), Some(line)) = (ctx.total.clone(), ctx.lines.first()) else {
            return Ok(Undo::none());
        };
        let seller_id = line.seller_id;

        // Until the capture is credited, the capture workflow posts the debit.
        let capture_id = ledger::capture_transaction_id(SplitOrderPayment::id_for(ctx.order_id));
        let credited = self
            .payouts
            .find_by_seller(seller_id)
            .await?
            .is_some_and(|account| account.has_transaction(&capture_id));
        if !credited {
            return Ok(Undo::none());
        }

        let debit =
            BalanceTransaction::commission(ledger::commission_transaction_id(ctx.order_id), total);
        let transaction_ids = ledger::post(&self.payouts, seller_id, &[debit]).await?;
        if !transaction_ids.is_empty() {
            tracing::info!(order_id = %ctx.order_id, %seller_id, "commission debited");
        }
        Undo::new(&DebitUndo {
            seller_id,
            transaction_ids,
        })
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        if undo.is_none() {
            return Ok(());
        }
        let undo: DebitUndo = undo.decode()?;
        if !undo.transaction_ids.is_empty() {
            self.payouts
                .revert_transactions(undo.seller_id, &undo.transaction_ids)
                .await?;
        }
        Ok(())
    }
}
