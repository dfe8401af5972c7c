//! Payout account aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, CurrencyCode, Money, OrderId, PayoutId, PayoutReversalId, SellerId};
use event_store::Version;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    AccountDataData, AccountDisabledData, OnboardingUpsertedData, PayoutAccountCreatedData,
    PayoutCreatedData, PayoutReversalCreatedData, PayoutReversalVoidedData, PayoutVoidedData,
    TransactionsAppliedData, TransactionsRevertedData,
};
use super::{
    BalanceTransaction, PayoutAccountEvent, PayoutBalance, PayoutError, apply_transactions,
    revert_transactions,
};
use crate::aggregate::Aggregate;

/// Status of a payout account.
///
/// ```text
/// Pending ──► Active ──► Disabled
///    └──────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Pending,
    Active,
    Disabled,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

/// Provider webhook actions understood by the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    AccountAuthorized,
    AccountDeauthorized,
    AccountRequiresAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Onboarding {
    pub id: Uuid,
    pub data: serde_json::Value,
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReversal {
    pub id: PayoutReversalId,
    pub amount: Money,
    pub provider_reference: String,
    /// Id of the balance debit recorded with this reversal.
    pub debit_id: String,
    pub voided: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub order_id: Option<OrderId>,
    pub amount: Money,
    pub transfer_id: String,
    pub voided: bool,
    pub reversals: Vec<PayoutReversal>,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    /// Sum of reversals that are still in effect.
    pub fn reversed_total(&self) -> Decimal {
        self.reversals
            .iter()
            .filter(|r| !r.voided)
            .map(|r| r.amount.amount)
            .sum()
    }

    pub fn reversible(&self) -> Decimal {
        self.amount.amount - self.reversed_total()
    }

    pub fn reversal(&self, id: PayoutReversalId) -> Option<&PayoutReversal> {
        self.reversals.iter().find(|r| r.id == id)
    }
}

/// A seller's account at the payout provider, with its balance ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutAccount {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    seller_id: Option<SellerId>,
    status: AccountStatus,
    reference_id: String,
    data: serde_json::Value,
    context: serde_json::Value,
    onboarding: Option<Onboarding>,
    payouts: Vec<Payout>,
    /// Transactions currently in effect; reverted ones are removed.
    ledger: Vec<BalanceTransaction>,
    balances: BTreeMap<CurrencyCode, PayoutBalance>,
}

impl Aggregate for PayoutAccount {
    type Event = PayoutAccountEvent;
    type Error = PayoutError;

    fn aggregate_type() -> &'static str {
        "PayoutAccount"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PayoutAccountEvent::PayoutAccountCreated(data) => {
                self.id = Some(data.account_id);
                self.seller_id = Some(data.seller_id);
                self.reference_id = data.reference_id;
                self.data = data.data;
                self.context = data.context;
                self.status = AccountStatus::Pending;
            }
            PayoutAccountEvent::OnboardingUpserted(data) => {
                self.onboarding = Some(Onboarding {
                    id: data.onboarding_id,
                    data: data.data,
                    context: data.context,
                });
            }
            PayoutAccountEvent::AccountActivated(data) => {
                self.status = AccountStatus::Active;
                self.data = data.data;
            }
            PayoutAccountEvent::AccountDisabled(_) => {
                self.status = AccountStatus::Disabled;
            }
            PayoutAccountEvent::AccountDataUpdated(data) => {
                self.data = data.data;
            }
            PayoutAccountEvent::TransactionsApplied(data) => {
                self.ledger.extend(data.transactions);
                self.store_balances(data.balances);
            }
            PayoutAccountEvent::TransactionsReverted(data) => {
                self.ledger.retain(|t| !data.transaction_ids.contains(&t.id));
                self.store_balances(data.balances);
            }
            PayoutAccountEvent::PayoutCreated(data) => {
                self.payouts.push(Payout {
                    id: data.payout_id,
                    order_id: data.order_id,
                    amount: data.amount,
                    transfer_id: data.transfer_id,
                    voided: false,
                    reversals: Vec::new(),
                    created_at: data.created_at,
                });
            }
            PayoutAccountEvent::PayoutVoided(data) => {
                if let Some(payout) = self.payout_mut(data.payout_id) {
                    payout.voided = true;
                }
            }
            PayoutAccountEvent::PayoutReversalCreated(data) => {
                if let Some(payout) = self.payout_mut(data.payout_id) {
                    payout.reversals.push(PayoutReversal {
                        id: data.reversal_id,
                        amount: data.amount,
                        provider_reference: data.provider_reference,
                        debit_id: data.debit.id.clone(),
                        voided: false,
                        created_at: data.created_at,
                    });
                }
                self.ledger.push(data.debit);
                self.store_balances(vec![data.balance]);
            }
            PayoutAccountEvent::PayoutReversalVoided(data) => {
                if let Some(payout) = self.payout_mut(data.payout_id)
                    && let Some(reversal) =
                        payout.reversals.iter_mut().find(|r| r.id == data.reversal_id)
                {
                    reversal.voided = true;
                }
                self.ledger.retain(|t| t.id != data.debit_id);
                self.store_balances(vec![data.balance]);
            }
        }
    }
}

// Query methods
impl PayoutAccount {
    /// A seller's account shares the seller's UUID, so a seller has at most one.
    pub fn id_for(seller_id: SellerId) -> AggregateId {
        AggregateId::from_uuid(seller_id.as_uuid())
    }

    pub fn seller_id(&self) -> Option<SellerId> {
        self.seller_id
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn context(&self) -> &serde_json::Value {
        &self.context
    }

    pub fn onboarding(&self) -> Option<&Onboarding> {
        self.onboarding.as_ref()
    }

    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    pub fn payout(&self, id: PayoutId) -> Option<&Payout> {
        self.payouts.iter().find(|p| p.id == id)
    }

    pub fn ledger(&self) -> &[BalanceTransaction] {
        &self.ledger
    }

    pub fn has_transaction(&self, id: &str) -> bool {
        self.ledger.iter().any(|t| t.id == id)
    }

    /// Checkpointed balance of a currency; zero if nothing was applied yet.
    pub fn balance(&self, currency: &CurrencyCode) -> PayoutBalance {
        self.balances
            .get(currency)
            .cloned()
            .unwrap_or_else(|| PayoutBalance::zero(currency.clone()))
    }

    pub fn balances(&self) -> impl Iterator<Item = &PayoutBalance> {
        self.balances.values()
    }

    /// Recomputes every balance from the ledger and compares it with the
    /// stored checkpoint.
    pub fn reconcile(&self) -> Result<(), PayoutError> {
        let mut currencies: Vec<&CurrencyCode> = self.balances.keys().collect();
        for tx in &self.ledger {
            if !currencies.contains(&&tx.amount.currency) {
                currencies.push(&tx.amount.currency);
            }
        }

        for currency in currencies {
            let txs: Vec<BalanceTransaction> = self
                .ledger
                .iter()
                .filter(|t| &t.amount.currency == currency)
                .cloned()
                .collect();
            let recomputed = apply_transactions(&PayoutBalance::zero(currency.clone()), &txs)?;
            let checkpoint = self.balance(currency);
            if recomputed.total != checkpoint.total {
                return Err(PayoutError::ReconciliationMismatch {
                    currency: currency.clone(),
                    checkpoint: checkpoint.total,
                    recomputed: recomputed.total,
                });
            }
        }
        Ok(())
    }

    fn payout_mut(&mut self, id: PayoutId) -> Option<&mut Payout> {
        self.payouts.iter_mut().find(|p| p.id == id)
    }

    fn store_balances(&mut self, balances: Vec<PayoutBalance>) {
        for balance in balances {
            self.balances.insert(balance.currency.clone(), balance);
        }
    }

    fn ensure_exists(&self) -> Result<(), PayoutError> {
        if self.id.is_none() {
            return Err(PayoutError::NotInitialized);
        }
        Ok(())
    }

    /// New checkpoints for `transactions`, one per currency they touch.
    fn next_balances(
        &self,
        transactions: &[BalanceTransaction],
        revert: bool,
    ) -> Result<Vec<PayoutBalance>, PayoutError> {
        let mut by_currency: Vec<(CurrencyCode, Vec<BalanceTransaction>)> = Vec::new();
        for tx in transactions {
            match by_currency
                .iter_mut()
                .find(|(c, _)| c == &tx.amount.currency)
            {
                Some((_, txs)) => txs.push(tx.clone()),
                None => by_currency.push((tx.amount.currency.clone(), vec![tx.clone()])),
            }
        }

        by_currency
            .into_iter()
            .map(|(currency, txs)| {
                let current = self.balance(&currency);
                if revert {
                    revert_transactions(&current, &txs)
                } else {
                    apply_transactions(&current, &txs)
                }
            })
            .collect()
    }
}

// Command methods (return events)
impl PayoutAccount {
    pub fn create(
        &self,
        seller_id: SellerId,
        reference_id: String,
        data: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        if self.id.is_some() {
            return Err(PayoutError::AlreadyExists);
        }
        Ok(vec![PayoutAccountEvent::PayoutAccountCreated(
            PayoutAccountCreatedData {
                account_id: Self::id_for(seller_id),
                seller_id,
                reference_id,
                data,
                context,
                created_at: Utc::now(),
            },
        )])
    }

    /// Creates the onboarding record or replaces its data.
    pub fn upsert_onboarding(
        &self,
        data: serde_json::Value,
        context: serde_json::Value,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let onboarding_id = self
            .onboarding
            .as_ref()
            .map(|o| o.id)
            .unwrap_or_else(Uuid::new_v4);
        Ok(vec![PayoutAccountEvent::OnboardingUpserted(
            OnboardingUpsertedData {
                onboarding_id,
                data,
                context,
            },
        )])
    }

    pub fn activate(&self, data: serde_json::Value) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        match self.status {
            AccountStatus::Pending => Ok(vec![PayoutAccountEvent::AccountActivated(
                AccountDataData { data },
            )]),
            AccountStatus::Active => Ok(vec![]),
            AccountStatus::Disabled => Err(PayoutError::InvalidTransition {
                status: self.status,
                action: "activate",
            }),
        }
    }

    pub fn disable(&self, reason: &str) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        match self.status {
            AccountStatus::Disabled => Ok(vec![]),
            _ => Ok(vec![PayoutAccountEvent::AccountDisabled(
                AccountDisabledData {
                    reason: reason.to_string(),
                },
            )]),
        }
    }

    pub fn update_data(
        &self,
        data: serde_json::Value,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        if self.data == data {
            return Ok(vec![]);
        }
        Ok(vec![PayoutAccountEvent::AccountDataUpdated(
            AccountDataData { data },
        )])
    }

    /// Maps a provider webhook to a state change.
    pub fn handle_webhook(
        &self,
        action: WebhookAction,
        data: serde_json::Value,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        match action {
            WebhookAction::AccountAuthorized => self.activate(data),
            WebhookAction::AccountDeauthorized => self.disable("deauthorized by provider"),
            WebhookAction::AccountRequiresAction => self.update_data(data),
        }
    }

    /// Applies balance transactions, skipping ids already in the ledger.
    pub fn apply_transactions(
        &self,
        transactions: &[BalanceTransaction],
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let mut fresh: Vec<BalanceTransaction> = Vec::new();
        for tx in transactions {
            if !self.has_transaction(&tx.id) && !fresh.iter().any(|t| t.id == tx.id) {
                fresh.push(tx.clone());
            }
        }
        if fresh.is_empty() {
            return Ok(vec![]);
        }

        let balances = self.next_balances(&fresh, false)?;
        Ok(vec![PayoutAccountEvent::TransactionsApplied(
            TransactionsAppliedData {
                transactions: fresh,
                balances,
            },
        )])
    }

    /// Takes transactions back out of the ledger. Unknown ids are ignored.
    pub fn revert_transactions(
        &self,
        transaction_ids: &[String],
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let reverted: Vec<BalanceTransaction> = self
            .ledger
            .iter()
            .filter(|t| transaction_ids.contains(&t.id))
            .cloned()
            .collect();
        if reverted.is_empty() {
            return Ok(vec![]);
        }

        let balances = self.next_balances(&reverted, true)?;
        Ok(vec![PayoutAccountEvent::TransactionsReverted(
            TransactionsRevertedData {
                transaction_ids: reverted.into_iter().map(|t| t.id).collect(),
                balances,
            },
        )])
    }

    /// Records a payout made through the provider. Only active accounts can
    /// be paid out, and an order is paid out at most once.
    pub fn create_payout(
        &self,
        payout_id: PayoutId,
        order_id: Option<OrderId>,
        amount: Money,
        transfer_id: String,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        if self.payout(payout_id).is_some() {
            return Ok(vec![]);
        }
        if self.status != AccountStatus::Active {
            return Err(PayoutError::AccountNotActive {
                status: self.status,
            });
        }
        if !amount.is_positive() {
            return Err(PayoutError::InvalidAmount(amount.amount));
        }
        if let Some(order_id) = order_id
            && self
                .payouts
                .iter()
                .any(|p| !p.voided && p.order_id == Some(order_id))
        {
            return Err(PayoutError::DuplicatePayout { order_id });
        }

        Ok(vec![PayoutAccountEvent::PayoutCreated(PayoutCreatedData {
            payout_id,
            order_id,
            amount,
            transfer_id,
            created_at: Utc::now(),
        })])
    }

    pub fn void_payout(&self, payout_id: PayoutId) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let Some(payout) = self.payout(payout_id) else {
            return Ok(vec![]);
        };
        if payout.voided {
            return Ok(vec![]);
        }
        if payout.reversed_total() > Decimal::ZERO {
            return Err(PayoutError::PayoutHasReversals(payout_id));
        }
        Ok(vec![PayoutAccountEvent::PayoutVoided(PayoutVoidedData {
            payout_id,
        })])
    }

    /// Reverses part of a payout and debits the balance by the same amount.
    pub fn create_reversal(
        &self,
        payout_id: PayoutId,
        reversal_id: PayoutReversalId,
        amount: Money,
        provider_reference: String,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let payout = self
            .payout(payout_id)
            .ok_or(PayoutError::PayoutNotFound(payout_id))?;
        if payout.reversal(reversal_id).is_some() {
            return Ok(vec![]);
        }
        if payout.voided {
            return Err(PayoutError::PayoutVoided(payout_id));
        }
        payout.amount.ensure_same_currency(&amount.currency)?;
        if !amount.is_positive() {
            return Err(PayoutError::InvalidAmount(amount.amount));
        }
        let available = payout.reversible();
        if amount.amount > available {
            return Err(PayoutError::ReversalExceedsPayout {
                requested: amount.amount,
                available,
            });
        }

        let debit = BalanceTransaction::reversal(format!("reversal:{reversal_id}"), amount.clone());
        let balance = apply_transactions(
            &self.balance(&amount.currency),
            std::slice::from_ref(&debit),
        )?;

        Ok(vec![PayoutAccountEvent::PayoutReversalCreated(
            PayoutReversalCreatedData {
                payout_id,
                reversal_id,
                amount,
                provider_reference,
                debit,
                balance,
                created_at: Utc::now(),
            },
        )])
    }

    /// Voids a reversal and takes its debit back out of the balance.
    pub fn void_reversal(
        &self,
        payout_id: PayoutId,
        reversal_id: PayoutReversalId,
    ) -> Result<Vec<PayoutAccountEvent>, PayoutError> {
        self.ensure_exists()?;
        let payout = self
            .payout(payout_id)
            .ok_or(PayoutError::PayoutNotFound(payout_id))?;
        let reversal = payout
            .reversal(reversal_id)
            .ok_or(PayoutError::ReversalNotFound(reversal_id))?;
        if reversal.voided {
            return Ok(vec![]);
        }

        let debit: Vec<BalanceTransaction> = self
            .ledger
            .iter()
            .filter(|t| t.id == reversal.debit_id)
            .cloned()
            .collect();
        let balance = revert_transactions(&self.balance(&reversal.amount.currency), &debit)?;

        Ok(vec![PayoutAccountEvent::PayoutReversalVoided(
            PayoutReversalVoidedData {
                payout_id,
                reversal_id,
                debit_id: reversal.debit_id.clone(),
                balance,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, "usd")
    }

    fn run(
        account: &mut PayoutAccount,
        command: impl FnOnce(&PayoutAccount) -> Result<Vec<PayoutAccountEvent>, PayoutError>,
    ) -> Result<usize, PayoutError> {
        let events = command(account)?;
        let n = events.len();
        account.apply_events(events);
        Ok(n)
    }

    fn active_account() -> PayoutAccount {
        let mut account = PayoutAccount::default();
        run(&mut account, |a| {
            a.create(SellerId::new(), "acct_1".into(), json!({}), json!({}))
        })
        .unwrap();
        run(&mut account, |a| a.activate(json!({"charges_enabled": true}))).unwrap();
        account
    }

    #[test]
    fn status_transitions() {
        let mut account = PayoutAccount::default();
        assert!(matches!(
            account.activate(json!({})),
            Err(PayoutError::NotInitialized)
        ));

        run(&mut account, |a| {
            a.create(SellerId::new(), "acct_1".into(), json!({}), json!({}))
        })
        .unwrap();
        assert_eq!(account.status(), AccountStatus::Pending);
        assert!(matches!(
            account.create(SellerId::new(), "acct_2".into(), json!({}), json!({})),
            Err(PayoutError::AlreadyExists)
        ));

        run(&mut account, |a| a.handle_webhook(WebhookAction::AccountAuthorized, json!({}))).unwrap();
        assert_eq!(account.status(), AccountStatus::Active);
        // Repeated webhooks are no-ops.
        assert_eq!(
            run(&mut account, |a| a.handle_webhook(WebhookAction::AccountAuthorized, json!({})))
                .unwrap(),
            0
        );

        run(&mut account, |a| a.handle_webhook(WebhookAction::AccountDeauthorized, json!({})))
            .unwrap();
        assert_eq!(account.status(), AccountStatus::Disabled);
        assert!(account.activate(json!({})).is_err());
    }

    #[test]
    fn requires_action_updates_data_only() {
        let mut account = PayoutAccount::default();
        run(&mut account, |a| {
            a.create(SellerId::new(), "acct_1".into(), json!({}), json!({}))
        })
        .unwrap();
        run(&mut account, |a| {
            a.handle_webhook(WebhookAction::AccountRequiresAction, json!({"due": ["tax_id"]}))
        })
        .unwrap();

        assert_eq!(account.status(), AccountStatus::Pending);
        assert_eq!(account.data(), &json!({"due": ["tax_id"]}));
    }

    #[test]
    fn onboarding_is_upserted() {
        let mut account = active_account();
        run(&mut account, |a| a.upsert_onboarding(json!({"url": "a"}), json!({}))).unwrap();
        let first = account.onboarding().unwrap().id;
        run(&mut account, |a| a.upsert_onboarding(json!({"url": "b"}), json!({}))).unwrap();

        let onboarding = account.onboarding().unwrap();
        assert_eq!(onboarding.id, first);
        assert_eq!(onboarding.data, json!({"url": "b"}));
    }

    #[test]
    fn transactions_are_deduplicated() {
        let mut account = active_account();
        let txs = vec![
            BalanceTransaction::capture("capture:o1", usd(dec!(100))),
            BalanceTransaction::commission("commission:o1", usd(dec!(10))),
            BalanceTransaction::capture("capture:o1", usd(dec!(100))),
        ];

        run(&mut account, |a| a.apply_transactions(&txs)).unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(90));
        assert_eq!(account.ledger().len(), 2);

        assert_eq!(run(&mut account, |a| a.apply_transactions(&txs)).unwrap(), 0);
        assert_eq!(account.balance(&"usd".into()).total, dec!(90));
        account.reconcile().unwrap();

        run(&mut account, |a| a.revert_transactions(&["commission:o1".to_string()])).unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(100));
        account.reconcile().unwrap();
    }

    #[test]
    fn payouts_need_an_active_account() {
        let mut account = PayoutAccount::default();
        run(&mut account, |a| {
            a.create(SellerId::new(), "acct_1".into(), json!({}), json!({}))
        })
        .unwrap();

        let err = account
            .create_payout(PayoutId::new(), None, usd(dec!(10)), "tr_1".into())
            .unwrap_err();
        assert!(matches!(err, PayoutError::AccountNotActive { .. }));
        assert_eq!(err.kind(), common::ErrorKind::Validation);
    }

    #[test]
    fn one_payout_per_order() {
        let mut account = active_account();
        let order = OrderId::new();
        let payout = PayoutId::new();
        run(&mut account, |a| a.create_payout(payout, Some(order), usd(dec!(90)), "tr_1".into()))
            .unwrap();

        // Same payout id is a replay.
        assert_eq!(
            run(&mut account, |a| a.create_payout(payout, Some(order), usd(dec!(90)), "tr_1".into()))
                .unwrap(),
            0
        );
        assert!(matches!(
            account.create_payout(PayoutId::new(), Some(order), usd(dec!(1)), "tr_2".into()),
            Err(PayoutError::DuplicatePayout { .. })
        ));

        run(&mut account, |a| a.void_payout(payout)).unwrap();
        run(&mut account, |a| {
            a.create_payout(PayoutId::new(), Some(order), usd(dec!(90)), "tr_3".into())
        })
        .unwrap();
    }

    #[test]
    fn reversal_bounded_by_payout_and_debits_balance() {
        let mut account = active_account();
        run(&mut account, |a| {
            a.apply_transactions(&[BalanceTransaction::capture("capture:o1", usd(dec!(100)))])
        })
        .unwrap();
        let payout = PayoutId::new();
        run(&mut account, |a| a.create_payout(payout, None, usd(dec!(50)), "tr_1".into())).unwrap();

        let reversal = PayoutReversalId::new();
        run(&mut account, |a| {
            a.create_reversal(payout, reversal, usd(dec!(20)), "trr_1".into())
        })
        .unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(80));
        assert_eq!(account.payout(payout).unwrap().reversible(), dec!(30));

        assert!(matches!(
            account.create_reversal(payout, PayoutReversalId::new(), usd(dec!(30.01)), "x".into()),
            Err(PayoutError::ReversalExceedsPayout { .. })
        ));
        assert!(matches!(
            account.create_reversal(payout, PayoutReversalId::new(), Money::new(dec!(1), "eur"), "x".into()),
            Err(PayoutError::Money(_))
        ));
        assert!(matches!(
            account.create_reversal(PayoutId::new(), PayoutReversalId::new(), usd(dec!(1)), "x".into()),
            Err(PayoutError::PayoutNotFound(_))
        ));
        assert!(account.void_payout(payout).is_err());

        run(&mut account, |a| a.void_reversal(payout, reversal)).unwrap();
        assert_eq!(account.balance(&"usd".into()).total, dec!(100));
        assert_eq!(account.payout(payout).unwrap().reversible(), dec!(50));
        account.reconcile().unwrap();
    }

    #[test]
    fn reconcile_detects_tampered_checkpoint() {
        let mut account = active_account();
        run(&mut account, |a| {
            a.apply_transactions(&[BalanceTransaction::capture("capture:o1", usd(dec!(10)))])
        })
        .unwrap();
        account.balances.insert(
            "usd".into(),
            PayoutBalance {
                currency: "usd".into(),
                total: dec!(11),
            },
        );

        assert!(matches!(
            account.reconcile(),
            Err(PayoutError::ReconciliationMismatch { .. })
        ));
    }
}
