//! Payout account service.

use common::{AggregateId, Money, OrderId, PayoutId, PayoutReversalId, SellerId};
use event_store::{EventQuery, EventStore, EventStoreExt};

use super::{BalanceTransaction, PayoutAccount, PayoutAccountEvent, PayoutError, WebhookAction};
use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

/// Service for seller payout accounts.
///
/// Balance mutations retry on version conflicts so that captures and
/// commissions of concurrent orders land on the same account safely.
pub struct PayoutAccountService<S: EventStore> {
    handler: CommandHandler<S, PayoutAccount>,
}

impl<S: EventStore> PayoutAccountService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    #[tracing::instrument(skip(self, data, context))]
    pub async fn create_account(
        &self,
        seller_id: SellerId,
        reference_id: &str,
        data: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        let result = self
            .handler
            .execute(PayoutAccount::id_for(seller_id), |account| {
                account.create(seller_id, reference_id.to_string(), data, context)
            })
            .await?;
        tracing::info!(%seller_id, "Payout account created");
        Ok(result)
    }

    pub async fn get(&self, id: AggregateId) -> Result<Option<PayoutAccount>, DomainError> {
        self.handler.load_existing(id).await
    }

    pub async fn find_by_seller(
        &self,
        seller_id: SellerId,
    ) -> Result<Option<PayoutAccount>, DomainError> {
        self.get(PayoutAccount::id_for(seller_id)).await
    }

    /// Looks an account up by its id at the payout provider.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<PayoutAccount>, DomainError> {
        let query = EventQuery::for_event_type("PayoutAccountCreated")
            .aggregate_type(PayoutAccount::aggregate_type())
            .payload_eq("/data/reference_id", reference_id)
            .limit(1);
        let ids = self.handler.store().find_aggregate_ids(query).await?;
        match ids.first() {
            Some(id) => self.get(*id).await,
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, data, context))]
    pub async fn upsert_onboarding(
        &self,
        id: AggregateId,
        data: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(id, |account| {
            account.upsert_onboarding(data.clone(), context.clone())
        })
        .await
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn activate(
        &self,
        id: AggregateId,
        data: serde_json::Value,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(id, |account| account.activate(data.clone()))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn disable(
        &self,
        id: AggregateId,
        reason: &str,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(id, |account| account.disable(reason))
            .await
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn update_data(
        &self,
        id: AggregateId,
        data: serde_json::Value,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(id, |account| account.update_data(data.clone()))
            .await
    }

    /// Applies a provider webhook to the account it references.
    #[tracing::instrument(skip(self, data))]
    pub async fn handle_webhook(
        &self,
        reference_id: &str,
        action: WebhookAction,
        data: serde_json::Value,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        let account = self
            .find_by_reference(reference_id)
            .await?
            .ok_or_else(|| DomainError::not_found(PayoutAccount::aggregate_type(), reference_id))?;
        let id = account
            .id()
            .ok_or_else(|| DomainError::not_found(PayoutAccount::aggregate_type(), reference_id))?;

        let result = self
            .execute_existing(id, |account| account.handle_webhook(action, data.clone()))
            .await?;
        tracing::info!(
            reference_id,
            ?action,
            status = %result.aggregate.status(),
            "Payout webhook applied"
        );
        Ok(result)
    }

    #[tracing::instrument(skip(self, transactions), fields(count = transactions.len()))]
    pub async fn apply_transactions(
        &self,
        seller_id: SellerId,
        transactions: &[BalanceTransaction],
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.apply_transactions(transactions)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revert_transactions(
        &self,
        seller_id: SellerId,
        transaction_ids: &[String],
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.revert_transactions(transaction_ids)
        })
        .await
    }

    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_payout(
        &self,
        seller_id: SellerId,
        payout_id: PayoutId,
        order_id: Option<OrderId>,
        amount: &Money,
        transfer_id: &str,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.create_payout(payout_id, order_id, amount.clone(), transfer_id.to_string())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn void_payout(
        &self,
        seller_id: SellerId,
        payout_id: PayoutId,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.void_payout(payout_id)
        })
        .await
    }

    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_reversal(
        &self,
        seller_id: SellerId,
        payout_id: PayoutId,
        reversal_id: PayoutReversalId,
        amount: &Money,
        provider_reference: &str,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.create_reversal(
                payout_id,
                reversal_id,
                amount.clone(),
                provider_reference.to_string(),
            )
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn void_reversal(
        &self,
        seller_id: SellerId,
        payout_id: PayoutId,
        reversal_id: PayoutReversalId,
    ) -> Result<CommandResult<PayoutAccount>, DomainError> {
        self.execute_existing(PayoutAccount::id_for(seller_id), |account| {
            account.void_reversal(payout_id, reversal_id)
        })
        .await
    }

    async fn execute_existing<F>(
        &self,
        id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<PayoutAccount>, DomainError>
    where
        F: Fn(&PayoutAccount) -> Result<Vec<PayoutAccountEvent>, PayoutError>,
    {
        match self.handler.execute_with_retry(id, command_fn).await {
            Err(DomainError::Payout(PayoutError::NotInitialized)) => {
                Err(DomainError::not_found(PayoutAccount::aggregate_type(), id))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::AccountStatus;
    use common::ErrorKind;
    use event_store::InMemoryEventStore;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn webhook_activates_account_found_by_reference() {
        let service = PayoutAccountService::new(InMemoryEventStore::new());
        let seller = SellerId::new();
        service
            .create_account(seller, "acct_123", json!({}), json!({"country": "US"}))
            .await
            .unwrap();

        let result = service
            .handle_webhook("acct_123", WebhookAction::AccountAuthorized, json!({"payouts_enabled": true}))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), AccountStatus::Active);

        let account = service.find_by_seller(seller).await.unwrap().unwrap();
        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.context(), &json!({"country": "US"}));

        let err = service
            .handle_webhook("acct_unknown", WebhookAction::AccountAuthorized, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn one_account_per_seller() {
        let service = PayoutAccountService::new(InMemoryEventStore::new());
        let seller = SellerId::new();
        service
            .create_account(seller, "acct_1", json!({}), json!({}))
            .await
            .unwrap();
        let err = service
            .create_account(seller, "acct_2", json!({}), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn concurrent_transactions_all_land() {
        let store = InMemoryEventStore::new();
        let service = Arc::new(PayoutAccountService::new(store));
        let seller = SellerId::new();
        service
            .create_account(seller, "acct_1", json!({}), json!({}))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .apply_transactions(
                        seller,
                        &[BalanceTransaction::capture(
                            format!("capture:{i}"),
                            Money::new(dec!(10), "usd"),
                        )],
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let account = service.find_by_seller(seller).await.unwrap().unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(40));
        account.reconcile().unwrap();
    }

    #[tokio::test]
    async fn transactions_for_missing_account_are_not_found() {
        let service = PayoutAccountService::new(InMemoryEventStore::new());
        let err = service
            .apply_transactions(
                SellerId::new(),
                &[BalanceTransaction::capture("c", Money::new(dec!(1), "usd"))],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
