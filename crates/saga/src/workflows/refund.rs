//! Refunds part of a split payment and reverses the seller's payout.
//!
//! The refund and the payout reversal form one unit: if the reversal cannot
//! be created, the recorded refund is rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, Money, OrderId, PayoutId, PayoutReversalId, SellerId};
use domain::{
    Aggregate, DomainError, PaymentStatus, PayoutAccountService, SplitOrderPayment,
    SplitPaymentService, SplitPaymentStatus,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SagaError;
use crate::services::{OrderRepository, PayoutProvider};
use crate::step::{Step, Undo, Workflow};

pub const WORKFLOW: &str = "refund_split_payment";

/// Namespace for reversal ids derived from refund ids.
const REVERSAL_NAMESPACE: Uuid = Uuid::from_u128(0x1c9e_4b27_83f0_4d5a_a6c2_9e07_54b1_d3f8);

/// The reversal created for a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalRecord {
    pub payout_id: PayoutId,
    pub reversal_id: PayoutReversalId,
    pub provider_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSplitPayment {
    pub split_payment_id: AggregateId,
    pub refund_id: String,
    pub amount: Money,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub reversal: Option<ReversalRecord>,
    pub payment_status: Option<PaymentStatus>,
}

impl RefundSplitPayment {
    /// Checks the refund against the payment without changing anything.
    ///
    /// An amount above what is still refundable is a validation error.
    pub async fn plan<S: EventStore>(
        split_payments: &SplitPaymentService<S>,
        split_payment_id: AggregateId,
        refund_id: impl Into<String>,
        amount: Money,
    ) -> Result<Self, SagaError> {
        let refund_id = refund_id.into();
        let payment = split_payments
            .get(split_payment_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found(SplitOrderPayment::aggregate_type(), split_payment_id)
            })?;
        payment
            .refund(&refund_id, &amount)
            .map_err(DomainError::from)?;

        let (Some(order_id), Some(seller_id)) = (payment.order_id(), payment.seller_id()) else {
            return Err(SagaError::NotFound(format!(
                "order of split payment {split_payment_id}"
            )));
        };

        Ok(Self {
            split_payment_id,
            refund_id,
            amount,
            order_id,
            seller_id,
            reversal: None,
            payment_status: None,
        })
    }

    pub fn reversal_id(&self) -> PayoutReversalId {
        PayoutReversalId::from_uuid(Uuid::new_v5(
            &REVERSAL_NAMESPACE,
            self.refund_id.as_bytes(),
        ))
    }
}

pub fn workflow<S: EventStore + 'static>(
    split_payments: Arc<SplitPaymentService<S>>,
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
    orders: Arc<dyn OrderRepository>,
) -> Workflow<RefundSplitPayment> {
    Workflow::new(WORKFLOW)
        .step(RecordRefund {
            split_payments: Arc::clone(&split_payments),
        })
        .step(CreatePayoutReversal { payouts, provider })
        .step(UpdateOrderPaymentStatus {
            split_payments,
            orders,
        })
}

#[derive(Debug, Serialize, Deserialize)]
struct RefundUndo {
    split_payment_id: AggregateId,
    refund_id: String,
}

struct RecordRefund<S: EventStore> {
    split_payments: Arc<SplitPaymentService<S>>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<RefundSplitPayment> for RecordRefund<S> {
    fn name(&self) -> &'static str {
        "record_refund"
    }

    async fn execute(&self, ctx: &mut RefundSplitPayment) -> Result<Undo, SagaError> {
        let result = self
            .split_payments
            .refund(ctx.split_payment_id, &ctx.refund_id, &ctx.amount)
            .await?;
        tracing::info!(
            split_payment_id = %ctx.split_payment_id,
            refund_id = %ctx.refund_id,
            refunded = %result.aggregate.refunded(),
            "refund recorded"
        );
        Undo::new(&RefundUndo {
            split_payment_id: ctx.split_payment_id,
            refund_id: ctx.refund_id.clone(),
        })
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let undo: RefundUndo = undo.decode()?;
        self.split_payments
            .revert_refund(undo.split_payment_id, &undo.refund_id)
            .await?;
        tracing::info!(refund_id = %undo.refund_id, "refund rolled back");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReversalUndo {
    seller_id: SellerId,
    payout_id: PayoutId,
    reversal_id: PayoutReversalId,
    provider_reference: String,
}

struct CreatePayoutReversal<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<RefundSplitPayment> for CreatePayoutReversal<S> {
    fn name(&self) -> &'static str {
        "create_payout_reversal"
    }

    async fn execute(&self, ctx: &mut RefundSplitPayment) -> Result<Undo, SagaError> {
        let account = self
            .payouts
            .find_by_seller(ctx.seller_id)
            .await?
            .ok_or_else(|| {
                SagaError::NotFound(format!("payout account of seller {}", ctx.seller_id))
            })?;
        let payout = account
            .payouts()
            .iter()
            .find(|p| !p.voided && p.order_id == Some(ctx.order_id))
            .cloned()
            .ok_or_else(|| {
                SagaError::NotFound(format!("payout for order {} to reverse", ctx.order_id))
            })?;

        let reversal_id = ctx.reversal_id();
        let provider_reference = self
            .provider
            .create_reversal(
                &payout.transfer_id,
                &ctx.amount,
                &format!("refund:{}", ctx.refund_id),
            )
            .await?;

        if let Err(error) = self
            .payouts
            .create_reversal(
                ctx.seller_id,
                payout.id,
                reversal_id,
                &ctx.amount,
                &provider_reference,
            )
            .await
        {
            if let Err(cancel_error) = self.provider.cancel_reversal(&provider_reference).await {
                tracing::warn!(
                    %provider_reference,
                    error = %cancel_error,
                    "failed to cancel unrecorded provider reversal"
                );
            }
            return Err(error.into());
        }

        tracing::info!(
            payout_id = %payout.id,
            %reversal_id,
            amount = %ctx.amount,
            "payout reversal created"
        );
        ctx.reversal = Some(ReversalRecord {
            payout_id: payout.id,
            reversal_id,
            provider_reference: provider_reference.clone(),
        });
        Undo::new(&ReversalUndo {
            seller_id: ctx.seller_id,
            payout_id: payout.id,
            reversal_id,
            provider_reference,
        })
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let undo: ReversalUndo = undo.decode()?;
        self.payouts
            .void_reversal(undo.seller_id, undo.payout_id, undo.reversal_id)
            .await?;
        self.provider
            .cancel_reversal(&undo.provider_reference)
            .await
    }
}

struct UpdateOrderPaymentStatus<S: EventStore> {
    split_payments: Arc<SplitPaymentService<S>>,
    orders: Arc<dyn OrderRepository>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<RefundSplitPayment> for UpdateOrderPaymentStatus<S> {
    fn name(&self) -> &'static str {
        "update_order_payment_status"
    }

    async fn execute(&self, ctx: &mut RefundSplitPayment) -> Result<Undo, SagaError> {
        let payment = self
            .split_payments
            .get(ctx.split_payment_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found(SplitOrderPayment::aggregate_type(), ctx.split_payment_id)
            })?;
        let status = match payment.status() {
            SplitPaymentStatus::Refunded => PaymentStatus::Refunded,
            _ => PaymentStatus::PartiallyRefunded,
        };

        let previous = self.orders.set_payment_status(ctx.order_id, status).await?;
        ctx.payment_status = Some(status);
        Undo::new(&(ctx.order_id, previous))
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let (order_id, previous): (OrderId, PaymentStatus) = undo.decode()?;
        self.orders.set_payment_status(order_id, previous).await?;
        Ok(())
    }
}
