//! The marketplace core: workflows wired to their collaborators and the
//! handlers that map inbound events onto them.

use std::sync::Arc;

use common::{
    AggregateId, CartId, CommissionRuleId, Money, OrderId, OrderSetId, PaymentCollectionId,
    SellerId,
};
use domain::{
    CommissionLine, CommissionRule, DomainError, NewCommissionRule, Order, OrderSet,
    PayoutAccount, PayoutAccountService, SplitOrderPayment, SplitPaymentService, WebhookAction,
};
use event_store::EventStore;

use crate::aggregate::SagaInstance;
use crate::bus::{EventBus, MarketplaceEvent};
use crate::error::SagaError;
use crate::hooks::HookRegistry;
use crate::runner::{RunOutcome, SagaRunner};
use crate::services::Collaborators;
use crate::state::SagaState;
use crate::step::RetryPolicy;
use crate::workflows::{
    CapturePayment, CreatePayout, CreatePayoutAccount, FinalizeCommission, InitializeOnboarding,
    PlaceOrderSet, RefundSplitPayment, capture_payment, finalize_commission, payout,
    place_order_set, refund,
};

/// Inbound event names the marketplace subscribes to.
pub const SUBSCRIPTIONS: [&str; 5] = [
    "checkout.completed",
    "order_set.placed",
    "payment.captured",
    "payment.refund_requested",
    "payout_account.webhook",
];

pub struct Marketplace<S: EventStore> {
    runner: SagaRunner<S>,
    split_payments: Arc<SplitPaymentService<S>>,
    payouts: Arc<PayoutAccountService<S>>,
    deps: Collaborators,
}

impl<S: EventStore + Clone + 'static> Marketplace<S> {
    pub fn new(store: S, deps: Collaborators) -> Self {
        Self {
            split_payments: Arc::new(SplitPaymentService::new(store.clone())),
            payouts: Arc::new(PayoutAccountService::new(store.clone())),
            runner: SagaRunner::new(store),
            deps,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.runner = self.runner.with_retry_policy(retry);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.runner = self.runner.with_hooks(hooks);
        self
    }

    pub fn runner(&self) -> &SagaRunner<S> {
        &self.runner
    }

    pub fn split_payments(&self) -> &SplitPaymentService<S> {
        &self.split_payments
    }

    pub fn payouts(&self) -> &PayoutAccountService<S> {
        &self.payouts
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Splits a completed cart into an order set, once per cart.
    #[tracing::instrument(skip(self))]
    pub async fn place_order_set(
        &self,
        cart_id: CartId,
    ) -> Result<RunOutcome<PlaceOrderSet>, SagaError> {
        let cart = self
            .deps
            .carts
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("cart {cart_id}")))?;
        let plan = PlaceOrderSet::plan(cart)?;
        let workflow = place_order_set::workflow(
            Arc::clone(&self.deps.orders),
            Arc::clone(&self.deps.inventory),
            Arc::clone(&self.split_payments),
            plan.split.drafts.len(),
        );
        self.runner
            .run(&workflow, &cart_id.to_string(), plan)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn finalize_commission(
        &self,
        order_id: OrderId,
    ) -> Result<RunOutcome<FinalizeCommission>, SagaError> {
        let workflow = finalize_commission::workflow(
            Arc::clone(&self.deps.orders),
            Arc::clone(&self.deps.commissions),
            Arc::clone(&self.payouts),
        );
        self.runner
            .run(
                &workflow,
                &order_id.to_string(),
                FinalizeCommission::new(order_id),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn capture_payment(
        &self,
        payment_id: &str,
        payment_collection_id: PaymentCollectionId,
    ) -> Result<RunOutcome<CapturePayment>, SagaError> {
        let workflow = capture_payment::workflow(
            Arc::clone(&self.split_payments),
            Arc::clone(&self.payouts),
            Arc::clone(&self.deps.commissions),
            Arc::clone(&self.deps.orders),
        );
        let key = format!("{payment_collection_id}:{payment_id}");
        self.runner
            .run(
                &workflow,
                &key,
                CapturePayment::new(payment_id, payment_collection_id),
            )
            .await
    }

    /// Refunds part of a split payment, once per `refund_id`.
    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn refund(
        &self,
        split_payment_id: AggregateId,
        refund_id: &str,
        amount: Money,
    ) -> Result<RunOutcome<RefundSplitPayment>, SagaError> {
        let plan =
            RefundSplitPayment::plan(&self.split_payments, split_payment_id, refund_id, amount)
                .await?;
        let workflow = refund::workflow(
            Arc::clone(&self.split_payments),
            Arc::clone(&self.payouts),
            Arc::clone(&self.deps.payout_provider),
            Arc::clone(&self.deps.orders),
        );
        self.runner.run(&workflow, refund_id, plan).await
    }

    #[tracing::instrument(skip(self, context))]
    pub async fn create_payout_account(
        &self,
        seller_id: SellerId,
        context: serde_json::Value,
    ) -> Result<RunOutcome<CreatePayoutAccount>, SagaError> {
        let plan = CreatePayoutAccount::plan(&self.payouts, seller_id, context).await?;
        let workflow = payout::create_account_workflow(
            Arc::clone(&self.payouts),
            Arc::clone(&self.split_payments),
            Arc::clone(&self.deps.commissions),
            Arc::clone(&self.deps.payout_provider),
        );
        self.runner
            .run(&workflow, &seller_id.to_string(), plan)
            .await
    }

    /// Starts (or restarts) provider onboarding for a seller's account.
    ///
    /// Runs are keyed by seller and context, so a repeated request with the
    /// same context returns the session already created.
    #[tracing::instrument(skip(self, context))]
    pub async fn initialize_onboarding(
        &self,
        seller_id: SellerId,
        context: serde_json::Value,
    ) -> Result<RunOutcome<InitializeOnboarding>, SagaError> {
        let workflow = payout::onboarding_workflow(
            Arc::clone(&self.payouts),
            Arc::clone(&self.deps.payout_provider),
        );
        let key = format!("{seller_id}:{context}");
        self.runner
            .run(&workflow, &key, InitializeOnboarding::new(seller_id, context))
            .await
    }

    /// Applies a provider webhook to the account it references.
    #[tracing::instrument(skip(self, data))]
    pub async fn handle_payout_webhook(
        &self,
        reference_id: &str,
        action: WebhookAction,
        data: serde_json::Value,
    ) -> Result<PayoutAccount, SagaError> {
        let result = self
            .payouts
            .handle_webhook(reference_id, action, data)
            .await?;
        Ok(result.aggregate)
    }

    /// Pays a seller out for an order, once per order.
    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_payout(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<RunOutcome<CreatePayout>, SagaError> {
        let plan = CreatePayout::plan(&self.payouts, seller_id, order_id, amount).await?;
        let workflow = payout::create_payout_workflow(
            Arc::clone(&self.payouts),
            Arc::clone(&self.deps.payout_provider),
        );
        self.runner
            .run(&workflow, &order_id.to_string(), plan)
            .await
    }

    #[tracing::instrument(skip(self, rule), fields(name = %rule.name))]
    pub async fn create_commission_rule(
        &self,
        rule: NewCommissionRule,
    ) -> Result<CommissionRule, SagaError> {
        let rule = rule.into_rule().map_err(DomainError::from)?;
        let rule = self.deps.commissions.insert_rule(rule).await?;
        tracing::info!(rule_id = %rule.id, reference = %rule.reference.as_str(), "commission rule created");
        Ok(rule)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_commission_rule_active(
        &self,
        id: CommissionRuleId,
        active: bool,
    ) -> Result<CommissionRule, SagaError> {
        self.deps.commissions.set_rule_active(id, active).await
    }

    pub async fn commission_rule(
        &self,
        id: CommissionRuleId,
    ) -> Result<Option<CommissionRule>, SagaError> {
        self.deps.commissions.get_rule(id).await
    }

    pub async fn commission_rules(&self) -> Result<Vec<CommissionRule>, SagaError> {
        self.deps.commissions.list_rules().await
    }

    pub async fn commission_lines(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<CommissionLine>, SagaError> {
        self.deps.commissions.lines_for_order(order_id).await
    }

    pub async fn order_set(&self, id: OrderSetId) -> Result<Option<OrderSet>, SagaError> {
        self.deps.orders.get_order_set(id).await
    }

    pub async fn orders_for_set(&self, id: OrderSetId) -> Result<Vec<Order>, SagaError> {
        self.deps.orders.orders_for_set(id).await
    }

    pub async fn order(&self, id: OrderId) -> Result<Option<Order>, SagaError> {
        self.deps.orders.get_order(id).await
    }

    pub async fn split_payment(
        &self,
        id: AggregateId,
    ) -> Result<Option<SplitOrderPayment>, SagaError> {
        Ok(self.split_payments.get(id).await?)
    }

    pub async fn payout_account(
        &self,
        seller_id: SellerId,
    ) -> Result<Option<PayoutAccount>, SagaError> {
        Ok(self.payouts.find_by_seller(seller_id).await?)
    }

    pub async fn saga(
        &self,
        workflow: &str,
        idempotency_key: &str,
    ) -> Result<Option<SagaInstance>, SagaError> {
        self.runner.find_saga(workflow, idempotency_key).await
    }

    /// Compensates an interrupted run of `workflow` for `idempotency_key`.
    #[tracing::instrument(skip(self))]
    pub async fn recover(
        &self,
        workflow: &str,
        idempotency_key: &str,
    ) -> Result<SagaState, SagaError> {
        let orders = Arc::clone(&self.deps.orders);
        let provider = Arc::clone(&self.deps.payout_provider);
        match workflow {
            place_order_set::WORKFLOW => {
                let workflow = place_order_set::workflow(
                    orders,
                    Arc::clone(&self.deps.inventory),
                    Arc::clone(&self.split_payments),
                    1,
                );
                self.runner.recover(&workflow, idempotency_key).await
            }
            finalize_commission::WORKFLOW => {
                let workflow = finalize_commission::workflow(
                    orders,
                    Arc::clone(&self.deps.commissions),
                    Arc::clone(&self.payouts),
                );
                self.runner.recover(&workflow, idempotency_key).await
            }
            capture_payment::WORKFLOW => {
                let workflow = capture_payment::workflow(
                    Arc::clone(&self.split_payments),
                    Arc::clone(&self.payouts),
                    Arc::clone(&self.deps.commissions),
                    orders,
                );
                self.runner.recover(&workflow, idempotency_key).await
            }
            refund::WORKFLOW => {
                let workflow = refund::workflow(
                    Arc::clone(&self.split_payments),
                    Arc::clone(&self.payouts),
                    provider,
                    orders,
                );
                self.runner.recover(&workflow, idempotency_key).await
            }
            payout::CREATE_ACCOUNT_WORKFLOW => {
                let workflow = payout::create_account_workflow(
                    Arc::clone(&self.payouts),
                    Arc::clone(&self.split_payments),
                    Arc::clone(&self.deps.commissions),
                    provider,
                );
                self.runner.recover(&workflow, idempotency_key).await
            }
            payout::ONBOARDING_WORKFLOW => {
                let workflow = payout::onboarding_workflow(Arc::clone(&self.payouts), provider);
                self.runner.recover(&workflow, idempotency_key).await
            }
            payout::CREATE_PAYOUT_WORKFLOW => {
                let workflow =
                    payout::create_payout_workflow(Arc::clone(&self.payouts), provider);
                self.runner.recover(&workflow, idempotency_key).await
            }
            other => Err(SagaError::NotFound(format!("workflow {other}"))),
        }
    }

    /// Handles one inbound event and returns the events it produces.
    #[tracing::instrument(skip(self, event), fields(event = event.name()))]
    pub async fn handle(
        &self,
        event: MarketplaceEvent,
    ) -> Result<Vec<MarketplaceEvent>, SagaError> {
        match event {
            MarketplaceEvent::CheckoutCompleted { cart_id } => {
                let outcome = self.place_order_set(cart_id).await?;
                Ok(vec![MarketplaceEvent::OrderSetPlaced {
                    order_set_id: outcome.context.order_set_id(),
                    order_ids: outcome.context.order_ids(),
                }])
            }
            MarketplaceEvent::OrderSetPlaced { order_ids, .. } => {
                let mut finalized = Vec::with_capacity(order_ids.len());
                for order_id in order_ids {
                    let outcome = self.finalize_commission(order_id).await?;
                    if let Some(total_commission) = outcome.context.total {
                        finalized.push(MarketplaceEvent::CommissionFinalized {
                            order_id,
                            total_commission,
                        });
                    }
                }
                Ok(finalized)
            }
            MarketplaceEvent::PaymentCaptured {
                payment_id,
                payment_collection_id,
            } => {
                self.capture_payment(&payment_id, payment_collection_id)
                    .await?;
                Ok(vec![])
            }
            MarketplaceEvent::RefundRequested {
                split_payment_id,
                refund_id,
                amount,
            } => {
                let refund_id = refund_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let outcome = self.refund(split_payment_id, &refund_id, amount).await?;
                let context = outcome.context;
                Ok(context
                    .reversal
                    .map(|reversal| MarketplaceEvent::PayoutReversalCreated {
                        payout_id: reversal.payout_id,
                        amount: context.amount,
                    })
                    .into_iter()
                    .collect())
            }
            MarketplaceEvent::PayoutAccountWebhook {
                action,
                account_id,
                data,
            } => {
                self.handle_payout_webhook(&account_id, action, data)
                    .await?;
                Ok(vec![])
            }
            MarketplaceEvent::PayoutReversalCreated { .. }
            | MarketplaceEvent::CommissionFinalized { .. } => Ok(vec![]),
        }
    }

    /// Builds the subscription table routing inbound events to [`Self::handle`].
    pub fn event_bus(self: &Arc<Self>) -> EventBus {
        SUBSCRIPTIONS
            .into_iter()
            .fold(EventBus::builder(), |builder, name| {
                let marketplace = Arc::clone(self);
                builder.subscribe(name, move |event| {
                    let marketplace = Arc::clone(&marketplace);
                    async move { marketplace.handle(event).await }
                })
            })
            .build()
    }
}
