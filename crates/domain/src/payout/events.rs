//! Payout account domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, OrderId, PayoutId, PayoutReversalId, SellerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BalanceTransaction, PayoutBalance};
use crate::aggregate::DomainEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PayoutAccountEvent {
    PayoutAccountCreated(PayoutAccountCreatedData),
    OnboardingUpserted(OnboardingUpsertedData),
    AccountActivated(AccountDataData),
    AccountDisabled(AccountDisabledData),
    AccountDataUpdated(AccountDataData),
    TransactionsApplied(TransactionsAppliedData),
    TransactionsReverted(TransactionsRevertedData),
    PayoutCreated(PayoutCreatedData),
    PayoutVoided(PayoutVoidedData),
    /// A reversal and the balance debit it causes, recorded together.
    PayoutReversalCreated(PayoutReversalCreatedData),
    PayoutReversalVoided(PayoutReversalVoidedData),
}

impl DomainEvent for PayoutAccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PayoutAccountEvent::PayoutAccountCreated(_) => "PayoutAccountCreated",
            PayoutAccountEvent::OnboardingUpserted(_) => "OnboardingUpserted",
            PayoutAccountEvent::AccountActivated(_) => "AccountActivated",
            PayoutAccountEvent::AccountDisabled(_) => "AccountDisabled",
            PayoutAccountEvent::AccountDataUpdated(_) => "AccountDataUpdated",
            PayoutAccountEvent::TransactionsApplied(_) => "TransactionsApplied",
            PayoutAccountEvent::TransactionsReverted(_) => "TransactionsReverted",
            PayoutAccountEvent::PayoutCreated(_) => "PayoutCreated",
            PayoutAccountEvent::PayoutVoided(_) => "PayoutVoided",
            PayoutAccountEvent::PayoutReversalCreated(_) => "PayoutReversalCreated",
            PayoutAccountEvent::PayoutReversalVoided(_) => "PayoutReversalVoided",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutAccountCreatedData {
    pub account_id: AggregateId,
    pub seller_id: SellerId,
    /// Account id at the payout provider.
    pub reference_id: String,
    pub data: serde_json::Value,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingUpsertedData {
    pub onboarding_id: Uuid,
    pub data: serde_json::Value,
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDataData {
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDisabledData {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsAppliedData {
    pub transactions: Vec<BalanceTransaction>,
    /// Checkpoints of every currency touched by the batch.
    pub balances: Vec<PayoutBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsRevertedData {
    pub transaction_ids: Vec<String>,
    pub balances: Vec<PayoutBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCreatedData {
    pub payout_id: PayoutId,
    pub order_id: Option<OrderId>,
    pub amount: Money,
    /// Transfer id at the payout provider.
    pub transfer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutVoidedData {
    pub payout_id: PayoutId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReversalCreatedData {
    pub payout_id: PayoutId,
    pub reversal_id: PayoutReversalId,
    pub amount: Money,
    /// Reversal id at the payout provider.
    pub provider_reference: String,
    pub debit: BalanceTransaction,
    pub balance: PayoutBalance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReversalVoidedData {
    pub payout_id: PayoutId,
    pub reversal_id: PayoutReversalId,
    pub debit_id: String,
    pub balance: PayoutBalance,
}
