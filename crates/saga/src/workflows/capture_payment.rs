//! Propagates a captured customer payment to the seller ledgers.
//!
//! Steps: capture every split payment of the collection, credit each
//! seller's payout balance with the capture and, once finalized, the
//! commission debit, then mark the seller orders captured. Every step is a
//! no-op for what it already did, so a redelivered capture changes nothing.
//! Sellers without a payout account are credited when the account is created.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, Money, OrderId, PaymentCollectionId, SellerId};
use domain::{
    Aggregate, PaymentStatus, PayoutAccountService, SplitPaymentService, SplitPaymentStatus,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::services::{CommissionStore, OrderRepository};
use crate::step::{Step, Undo, Workflow};
use crate::workflows::ledger;

pub const WORKFLOW: &str = "capture_payment";

/// One seller's captured share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedSlice {
    pub split_payment_id: AggregateId,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub amount: Money,
}

/// Balance transactions applied to one seller by this capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerCredit {
    pub seller_id: SellerId,
    pub transaction_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturePayment {
    pub payment_id: String,
    pub payment_collection_id: PaymentCollectionId,
    pub captured: Vec<CapturedSlice>,
    pub credited: Vec<SellerCredit>,
}

impl CapturePayment {
    pub fn new(payment_id: impl Into<String>, payment_collection_id: PaymentCollectionId) -> Self {
        Self {
            payment_id: payment_id.into(),
            payment_collection_id,
            captured: Vec::new(),
            credited: Vec::new(),
        }
    }
}

pub fn workflow<S: EventStore + 'static>(
    split_payments: Arc<SplitPaymentService<S>>,
    payouts: Arc<PayoutAccountService<S>>,
    commissions: Arc<dyn CommissionStore>,
    orders: Arc<dyn OrderRepository>,
) -> Workflow<CapturePayment> {
    Workflow::new(WORKFLOW)
        .step(CaptureSplitPayments { split_payments })
        .step(CreditSellerBalances {
            payouts,
            commissions,
        })
        .step(MarkOrdersCaptured { orders })
}

#[derive(Debug, Serialize, Deserialize)]
struct CaptureUndo {
    payment_id: String,
    split_payment_ids: Vec<AggregateId>,
}

struct CaptureSplitPayments<S: EventStore> {
    split_payments: Arc<SplitPaymentService<S>>,
}

impl<S: EventStore> CaptureSplitPayments<S> {
    async fn revert(&self, payment_id: &str, ids: &[AggregateId]) -> Result<(), SagaError> {
        for id in ids {
            self.split_payments.revert_capture(*id, payment_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: EventStore + 'static> Step<CapturePayment> for CaptureSplitPayments<S> {
    fn name(&self) -> &'static str {
        "capture_split_payments"
    }

    async fn execute(&self, ctx: &mut CapturePayment) -> Result<Undo, SagaError> {
        let payments = self
            .split_payments
            .list_by_collection(ctx.payment_collection_id)
            .await?;
        if payments.is_empty() {
            return Err(SagaError::NotFound(format!(
                "split payments of collection {}",
                ctx.payment_collection_id
            )));
        }

        let mut newly_captured = Vec::new();
        let mut captured = Vec::new();
        for payment in payments {
            if payment.status() == SplitPaymentStatus::Canceled {
                continue;
            }
            let (Some(id), Some(order_id), Some(seller_id)) =
                (payment.id(), payment.order_id(), payment.seller_id())
            else {
                continue;
            };

            match self.split_payments.capture(id, &ctx.payment_id).await {
                Ok(result) => {
                    if !result.events.is_empty() {
                        newly_captured.push(id);
                    }
                    captured.push(CapturedSlice {
                        split_payment_id: id,
                        order_id,
                        seller_id,
                        amount: result.aggregate.captured(),
                    });
                }
                Err(error) => {
                    if let Err(revert_error) = self.revert(&ctx.payment_id, &newly_captured).await {
                        tracing::warn!(error = %revert_error, "failed to revert partial capture");
                    }
                    return Err(error.into());
                }
            }
        }

        tracing::info!(
            payment_id = %ctx.payment_id,
            captured = captured.len(),
            new = newly_captured.len(),
            "split payments captured"
        );
        ctx.captured = captured;
        Undo::new(&CaptureUndo {
            payment_id: ctx.payment_id.clone(),
            split_payment_ids: newly_captured,
        })
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let undo: CaptureUndo = undo.decode()?;
        self.revert(&undo.payment_id, &undo.split_payment_ids).await
    }
}

struct CreditSellerBalances<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
    commissions: Arc<dyn CommissionStore>,
}

impl<S: EventStore> CreditSellerBalances<S> {
    async fn revert(&self, credits: &[SellerCredit]) {
        for credit in credits {
            ledger::revert(&self.payouts, credit.seller_id, &credit.transaction_ids).await;
        }
    }
}

#[async_trait]
impl<S: EventStore + 'static> Step<CapturePayment> for CreditSellerBalances<S> {
    fn name(&self) -> &'static str {
        "credit_seller_balances"
    }

    async fn execute(&self, ctx: &mut CapturePayment) -> Result<Undo, SagaError> {
        let mut credits = Vec::new();

        for slice in &ctx.captured {
            // Credited by the account workflow once the seller has one.
            if self.payouts.find_by_seller(slice.seller_id).await?.is_none() {
                tracing::info!(
                    seller_id = %slice.seller_id,
                    order_id = %slice.order_id,
                    "seller has no payout account yet, credit deferred"
                );
                continue;
            }

            let result = ledger::credit_capture(
                &self.payouts,
                self.commissions.as_ref(),
                slice.seller_id,
                slice.split_payment_id,
                slice.order_id,
                &slice.amount,
            )
            .await;

            match result {
                Ok(transaction_ids) if transaction_ids.is_empty() => {}
                Ok(transaction_ids) => credits.push(SellerCredit {
                    seller_id: slice.seller_id,
                    transaction_ids,
                }),
                Err(error) => {
                    self.revert(&credits).await;
                    return Err(error);
                }
            }
        }

        ctx.credited = credits.clone();
        Undo::new(&credits)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let credits: Vec<SellerCredit> = undo.decode()?;
        for credit in &credits {
            self.payouts
                .revert_transactions(credit.seller_id, &credit.transaction_ids)
                .await?;
        }
        Ok(())
    }
}

struct MarkOrdersCaptured {
    orders: Arc<dyn OrderRepository>,
}

impl MarkOrdersCaptured {
    async fn restore(&self, previous: &[(OrderId, PaymentStatus)]) -> Result<(), SagaError> {
        for (order_id, status) in previous {
            self.orders.set_payment_status(*order_id, *status).await?;
        }
        Ok(())
    }

    /// Restores the statuses changed so far and hands back `error`.
    async fn abort(&self, previous: &[(OrderId, PaymentStatus)], error: SagaError) -> SagaError {
        if let Err(restore_error) = self.restore(previous).await {
            tracing::warn!(error = %restore_error, "failed to restore order payment status");
        }
        error
    }
}

#[async_trait]
impl Step<CapturePayment> for MarkOrdersCaptured {
    fn name(&self) -> &'static str {
        "mark_orders_captured"
    }

    async fn execute(&self, ctx: &mut CapturePayment) -> Result<Undo, SagaError> {
        let mut previous = Vec::new();
        for slice in &ctx.captured {
            let status = match self.orders.get_order(slice.order_id).await {
                Ok(Some(order)) => order.payment_status,
                Ok(None) => continue,
                Err(error) => return Err(self.abort(&previous, error).await),
            };
            if status != PaymentStatus::Authorized {
                continue;
            }
            if let Err(error) = self
                .orders
                .set_payment_status(slice.order_id, PaymentStatus::Captured)
                .await
            {
                return Err(self.abort(&previous, error).await);
            }
            previous.push((slice.order_id, status));
        }
        Undo::new(&previous)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let previous: Vec<(OrderId, PaymentStatus)> = undo.decode()?;
        self.restore(&previous).await
    }
}
