//! Payout provider trait and in-memory implementation.
//!
//! The provider holds connected seller accounts and moves money to them.
//! Every money movement takes an idempotency key; repeating a call with the
//! same key returns the original result instead of moving money twice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, SellerId};
use parking_lot::RwLock;
use serde_json::json;

use crate::error::SagaError;

/// An account created at the provider.
#[derive(Debug, Clone)]
pub struct ProviderAccount {
    pub reference_id: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait PayoutProvider: Send + Sync {
    async fn create_account(
        &self,
        seller_id: SellerId,
        context: &serde_json::Value,
    ) -> Result<ProviderAccount, SagaError>;

    async fn delete_account(&self, reference_id: &str) -> Result<(), SagaError>;

    /// Starts an onboarding session and returns its provider payload.
    async fn initialize_onboarding(
        &self,
        reference_id: &str,
        context: &serde_json::Value,
    ) -> Result<serde_json::Value, SagaError>;

    /// Transfers `amount` to the account. Returns the transfer id.
    async fn create_transfer(
        &self,
        reference_id: &str,
        amount: &Money,
        idempotency_key: &str,
    ) -> Result<String, SagaError>;

    async fn cancel_transfer(&self, transfer_id: &str) -> Result<(), SagaError>;

    /// Pulls `amount` back from a transfer. Returns the reversal reference.
    async fn create_reversal(
        &self,
        transfer_id: &str,
        amount: &Money,
        idempotency_key: &str,
    ) -> Result<String, SagaError>;

    async fn cancel_reversal(&self, reversal_reference: &str) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryProviderState {
    accounts: HashMap<String, SellerId>,
    transfers: HashMap<String, (String, Money)>,
    reversals: HashMap<String, (String, Money)>,
    idempotency: HashMap<String, String>,
    next_id: u32,
    fail_on_create_account: bool,
    fail_on_transfer: bool,
    fail_on_reversal: bool,
    transient_failures: u32,
}

impl InMemoryProviderState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:04}", self.next_id)
    }

    fn take_transient(&mut self) -> Result<(), SagaError> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(SagaError::transient("payout_provider", "provider request timed out"));
        }
        Ok(())
    }
}

/// In-memory payout provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayoutProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
}

impl InMemoryPayoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create_account(&self, fail: bool) {
        self.state.write().fail_on_create_account = fail;
    }

    pub fn set_fail_on_transfer(&self, fail: bool) {
        self.state.write().fail_on_transfer = fail;
    }

    pub fn set_fail_on_reversal(&self, fail: bool) {
        self.state.write().fail_on_reversal = fail;
    }

    /// Makes the next `count` calls fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.state.write().transient_failures = count;
    }

    pub fn account_count(&self) -> usize {
        self.state.read().accounts.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.state.read().transfers.len()
    }

    pub fn reversal_count(&self) -> usize {
        self.state.read().reversals.len()
    }
}

#[async_trait]
impl PayoutProvider for InMemoryPayoutProvider {
    async fn create_account(
        &self,
        seller_id: SellerId,
        context: &serde_json::Value,
    ) -> Result<ProviderAccount, SagaError> {
        let mut state = self.state.write();
        state.take_transient()?;
        if state.fail_on_create_account {
            return Err(SagaError::rejected("payout_provider", "account creation declined"));
        }

        if let Some((reference_id, _)) = state.accounts.iter().find(|(_, s)| **s == seller_id) {
            return Ok(ProviderAccount {
                reference_id: reference_id.clone(),
                data: json!({ "id": reference_id, "context": context }),
            });
        }

        let reference_id = state.next("acct");
        state.accounts.insert(reference_id.clone(), seller_id);
        Ok(ProviderAccount {
            data: json!({ "id": reference_id, "context": context }),
            reference_id,
        })
    }

    async fn delete_account(&self, reference_id: &str) -> Result<(), SagaError> {
        self.state.write().accounts.remove(reference_id);
        Ok(())
    }

    async fn initialize_onboarding(
        &self,
        reference_id: &str,
        context: &serde_json::Value,
    ) -> Result<serde_json::Value, SagaError> {
        let mut state = self.state.write();
        state.take_transient()?;
        if !state.accounts.contains_key(reference_id) {
            return Err(SagaError::NotFound(format!("provider account {reference_id}")));
        }
        let session = state.next("onb");
        Ok(json!({
            "session": session,
            "url": format!("https://payouts.example/onboarding/{session}"),
            "context": context,
        }))
    }

    async fn create_transfer(
        &self,
        reference_id: &str,
        amount: &Money,
        idempotency_key: &str,
    ) -> Result<String, SagaError> {
        let mut state = self.state.write();
        if let Some(existing) = state.idempotency.get(idempotency_key) {
            return Ok(existing.clone());
        }
        state.take_transient()?;
        if state.fail_on_transfer {
            return Err(SagaError::rejected("payout_provider", "transfer declined"));
        }
        if !state.accounts.contains_key(reference_id) {
            return Err(SagaError::NotFound(format!("provider account {reference_id}")));
        }

        let transfer_id = state.next("tr");
        state
            .transfers
            .insert(transfer_id.clone(), (reference_id.to_string(), amount.clone()));
        state
            .idempotency
            .insert(idempotency_key.to_string(), transfer_id.clone());
        Ok(transfer_id)
    }

    async fn cancel_transfer(&self, transfer_id: &str) -> Result<(), SagaError> {
        let mut state = self.state.write();
        state.transfers.remove(transfer_id);
        state.idempotency.retain(|_, id| id != transfer_id);
        Ok(())
    }

    async fn create_reversal(
        &self,
        transfer_id: &str,
        amount: &Money,
        idempotency_key: &str,
    ) -> Result<String, SagaError> {
        let mut state = self.state.write();
        if let Some(existing) = state.idempotency.get(idempotency_key) {
            return Ok(existing.clone());
        }
        state.take_transient()?;
        if state.fail_on_reversal {
            return Err(SagaError::rejected("payout_provider", "reversal declined"));
        }
        let Some((_, transferred)) = state.transfers.get(transfer_id) else {
            return Err(SagaError::NotFound(format!("transfer {transfer_id}")));
        };
        if amount.currency != transferred.currency || amount.amount > transferred.amount {
            return Err(SagaError::rejected(
                "payout_provider",
                format!("reversal of {amount} exceeds transfer {transfer_id}"),
            ));
        }

        let reference = state.next("trr");
        state
            .reversals
            .insert(reference.clone(), (transfer_id.to_string(), amount.clone()));
        state
            .idempotency
            .insert(idempotency_key.to_string(), reference.clone());
        Ok(reference)
    }

    async fn cancel_reversal(&self, reversal_reference: &str) -> Result<(), SagaError> {
        let mut state = self.state.write();
        state.reversals.remove(reversal_reference);
        state.idempotency.retain(|_, id| id != reversal_reference);
        Ok(())
    }
}
