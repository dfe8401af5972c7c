//! Payout account creation, onboarding and payouts through the provider.
//!
//! A new account is credited with the seller's payments captured before it
//! existed.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, Money, OrderId, PayoutId, SellerId};
use domain::{
    AccountStatus, Aggregate, DomainError, PayoutAccount, PayoutAccountService,
    SplitPaymentService, SplitPaymentStatus,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SagaError;
use crate::services::{CommissionStore, PayoutProvider};
use crate::step::{Step, Undo, Workflow};
use crate::workflows::ledger;

pub const CREATE_ACCOUNT_WORKFLOW: &str = "create_payout_account";
pub const ONBOARDING_WORKFLOW: &str = "payout_account_onboarding";
pub const CREATE_PAYOUT_WORKFLOW: &str = "create_payout";

/// Namespace for payout ids derived from order ids.
const PAYOUT_NAMESPACE: Uuid = Uuid::from_u128(0x7a41_0c6e_52d9_4f1b_8e3a_d2c5_6b90_e417);

async fn require_account<S: EventStore>(
    payouts: &PayoutAccountService<S>,
    seller_id: SellerId,
) -> Result<PayoutAccount, SagaError> {
    payouts
        .find_by_seller(seller_id)
        .await?
        .ok_or_else(|| {
            DomainError::not_found(PayoutAccount::aggregate_type(), PayoutAccount::id_for(seller_id))
                .into()
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayoutAccount {
    pub seller_id: SellerId,
    pub context: serde_json::Value,
    pub reference_id: Option<String>,
    pub account_id: Option<AggregateId>,
    /// Balance transactions posted for payments captured before the account.
    #[serde(default)]
    pub backfilled: Vec<String>,
}

impl CreatePayoutAccount {
    /// A seller has at most one payout account.
    pub async fn plan<S: EventStore>(
        payouts: &PayoutAccountService<S>,
        seller_id: SellerId,
        context: serde_json::Value,
    ) -> Result<Self, SagaError> {
        if payouts.find_by_seller(seller_id).await?.is_some() {
            return Err(SagaError::Conflict(format!(
                "seller {seller_id} already has a payout account"
            )));
        }
        Ok(Self {
            seller_id,
            context,
            reference_id: None,
            account_id: None,
            backfilled: Vec::new(),
        })
    }
}

pub fn create_account_workflow<S: EventStore + 'static>(
    payouts: Arc<PayoutAccountService<S>>,
    split_payments: Arc<SplitPaymentService<S>>,
    commissions: Arc<dyn CommissionStore>,
    provider: Arc<dyn PayoutProvider>,
) -> Workflow<CreatePayoutAccount> {
    Workflow::new(CREATE_ACCOUNT_WORKFLOW)
        .step(CreateProviderAccount { provider })
        .step(RecordPayoutAccount {
            payouts: Arc::clone(&payouts),
        })
        .step(BackfillSellerBalance {
            payouts,
            split_payments,
            commissions,
        })
}

struct CreateProviderAccount {
    provider: Arc<dyn PayoutProvider>,
}

#[async_trait]
impl Step<CreatePayoutAccount> for CreateProviderAccount {
    fn name(&self) -> &'static str {
        "create_provider_account"
    }

    async fn execute(&self, ctx: &mut CreatePayoutAccount) -> Result<Undo, SagaError> {
        let account = self
            .provider
            .create_account(ctx.seller_id, &ctx.context)
            .await?;
        ctx.context = account.data;
        ctx.reference_id = Some(account.reference_id.clone());
        Undo::new(&account.reference_id)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let reference_id: String = undo.decode()?;
        self.provider.delete_account(&reference_id).await
    }
}

struct RecordPayoutAccount<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<CreatePayoutAccount> for RecordPayoutAccount<S> {
    fn name(&self) -> &'static str {
        "record_payout_account"
    }

    async fn execute(&self, ctx: &mut CreatePayoutAccount) -> Result<Undo, SagaError> {
        let reference_id = ctx
            .reference_id
            .clone()
            .ok_or_else(|| SagaError::NotFound("provider account reference".into()))?;
        let result = self
            .payouts
            .create_account(
                ctx.seller_id,
                &reference_id,
                ctx.context.clone(),
                serde_json::Value::Null,
            )
            .await?;
        ctx.account_id = result.aggregate.id();
        Ok(Undo::none())
    }

    async fn compensate(&self, _undo: Undo) -> Result<(), SagaError> {
        Ok(())
    }
}

struct BackfillSellerBalance<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
    split_payments: Arc<SplitPaymentService<S>>,
    commissions: Arc<dyn CommissionStore>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<CreatePayoutAccount> for BackfillSellerBalance<S> {
    fn name(&self) -> &'static str {
        "backfill_seller_balance"
    }

    async fn execute(&self, ctx: &mut CreatePayoutAccount) -> Result<Undo, SagaError> {
        // The account is recorded before this lookup, so a capture running
        // concurrently either sees the account or is listed here.
        let payments = self.split_payments.list_by_seller(ctx.seller_id).await?;

        let mut posted = Vec::new();
        for payment in payments {
            if !matches!(
                payment.status(),
                SplitPaymentStatus::Captured | SplitPaymentStatus::Refunded
            ) {
                continue;
            }
            let (Some(id), Some(order_id)) = (payment.id(), payment.order_id()) else {
                continue;
            };
            match ledger::credit_capture(
                &self.payouts,
                self.commissions.as_ref(),
                ctx.seller_id,
                id,
                order_id,
                &payment.captured(),
            )
            .await
            {
                Ok(ids) => posted.extend(ids),
                Err(error) => {
                    ledger::revert(&self.payouts, ctx.seller_id, &posted).await;
                    return Err(error);
                }
            }
        }

        if !posted.is_empty() {
            tracing::info!(
                seller_id = %ctx.seller_id,
                transactions = posted.len(),
                "seller balance backfilled"
            );
        }
        let undo = Undo::new(&(ctx.seller_id, &posted))?;
        ctx.backfilled = posted;
        Ok(undo)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let (seller_id, posted): (SellerId, Vec<String>) = undo.decode()?;
        if !posted.is_empty() {
            self.payouts.revert_transactions(seller_id, &posted).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeOnboarding {
    pub seller_id: SellerId,
    pub context: serde_json::Value,
    /// Provider onboarding payload, set by the first step.
    pub session: Option<serde_json::Value>,
}

impl InitializeOnboarding {
    pub fn new(seller_id: SellerId, context: serde_json::Value) -> Self {
        Self {
            seller_id,
            context,
            session: None,
        }
    }
}

pub fn onboarding_workflow<S: EventStore + 'static>(
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
) -> Workflow<InitializeOnboarding> {
    Workflow::new(ONBOARDING_WORKFLOW)
        .step(StartProviderOnboarding {
            payouts: Arc::clone(&payouts),
            provider,
        })
        .step(RecordOnboarding { payouts })
}

struct StartProviderOnboarding<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<InitializeOnboarding> for StartProviderOnboarding<S> {
    fn name(&self) -> &'static str {
        "start_provider_onboarding"
    }

    async fn execute(&self, ctx: &mut InitializeOnboarding) -> Result<Undo, SagaError> {
        let account = require_account(&self.payouts, ctx.seller_id).await?;
        let session = self
            .provider
            .initialize_onboarding(account.reference_id(), &ctx.context)
            .await?;
        ctx.session = Some(session);
        // Provider sessions expire on their own.
        Ok(Undo::none())
    }

    async fn compensate(&self, _undo: Undo) -> Result<(), SagaError> {
        Ok(())
    }
}

struct RecordOnboarding<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<InitializeOnboarding> for RecordOnboarding<S> {
    fn name(&self) -> &'static str {
        "record_onboarding"
    }

    async fn execute(&self, ctx: &mut InitializeOnboarding) -> Result<Undo, SagaError> {
        let session = ctx.session.clone().unwrap_or_default();
        self.payouts
            .upsert_onboarding(
                PayoutAccount::id_for(ctx.seller_id),
                session,
                ctx.context.clone(),
            )
            .await?;
        tracing::info!(seller_id = %ctx.seller_id, "payout onboarding initialized");
        Ok(Undo::none())
    }

    async fn compensate(&self, _undo: Undo) -> Result<(), SagaError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayout {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub amount: Money,
    pub payout_id: PayoutId,
    pub transfer_id: Option<String>,
}

impl CreatePayout {
    /// Only active accounts are paid out.
    pub async fn plan<S: EventStore>(
        payouts: &PayoutAccountService<S>,
        seller_id: SellerId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<Self, SagaError> {
        let account = require_account(payouts, seller_id).await?;
        if account.status() != AccountStatus::Active {
            return Err(SagaError::Validation(format!(
                "payout account of seller {seller_id} is {}",
                account.status()
            )));
        }
        if !amount.is_positive() {
            return Err(SagaError::Validation(format!("invalid payout amount {amount}")));
        }
        Ok(Self {
            seller_id,
            order_id,
            amount,
            payout_id: Self::payout_id_for(order_id),
            transfer_id: None,
        })
    }

    pub fn payout_id_for(order_id: OrderId) -> PayoutId {
        PayoutId::from_uuid(Uuid::new_v5(&PAYOUT_NAMESPACE, order_id.as_uuid().as_bytes()))
    }
}

pub fn create_payout_workflow<S: EventStore + 'static>(
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
) -> Workflow<CreatePayout> {
    Workflow::new(CREATE_PAYOUT_WORKFLOW)
        .step(CreateTransfer {
            payouts: Arc::clone(&payouts),
            provider,
        })
        .step(RecordPayout { payouts })
}

struct CreateTransfer<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
    provider: Arc<dyn PayoutProvider>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<CreatePayout> for CreateTransfer<S> {
    fn name(&self) -> &'static str {
        "create_transfer"
    }

    async fn execute(&self, ctx: &mut CreatePayout) -> Result<Undo, SagaError> {
        let account = require_account(&self.payouts, ctx.seller_id).await?;
        let transfer_id = self
            .provider
            .create_transfer(
                account.reference_id(),
                &ctx.amount,
                &ctx.payout_id.to_string(),
            )
            .await?;
        ctx.transfer_id = Some(transfer_id.clone());
        Undo::new(&transfer_id)
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let transfer_id: String = undo.decode()?;
        self.provider.cancel_transfer(&transfer_id).await
    }
}

struct RecordPayout<S: EventStore> {
    payouts: Arc<PayoutAccountService<S>>,
}

#[async_trait]
impl<S: EventStore + 'static> Step<CreatePayout> for RecordPayout<S> {
    fn name(&self) -> &'static str {
        "record_payout"
    }

    async fn execute(&self, ctx: &mut CreatePayout) -> Result<Undo, SagaError> {
        let transfer_id = ctx
            .transfer_id
            .clone()
            .ok_or_else(|| SagaError::NotFound(format!("transfer of payout {}", ctx.payout_id)))?;
        self.payouts
            .create_payout(
                ctx.seller_id,
                ctx.payout_id,
                Some(ctx.order_id),
                &ctx.amount,
                &transfer_id,
            )
            .await?;
        tracing::info!(
            payout_id = %ctx.payout_id,
            order_id = %ctx.order_id,
            amount = %ctx.amount,
            "payout created"
        );
        Undo::new(&(ctx.seller_id, ctx.payout_id))
    }

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError> {
        let (seller_id, payout_id): (SellerId, PayoutId) = undo.decode()?;
        self.payouts.void_payout(seller_id, payout_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_id_is_stable_per_order() {
        let order = OrderId::new();
        assert_eq!(
            CreatePayout::payout_id_for(order),
            CreatePayout::payout_id_for(order)
        );
        assert_ne!(
            CreatePayout::payout_id_for(order),
            CreatePayout::payout_id_for(OrderId::new())
        );
    }
}
