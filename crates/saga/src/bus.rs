//! Marketplace events and the subscription table that routes them.
//!
//! The table is built once at start-up, mapping an event name to an ordered
//! list of handlers. Handlers may return follow-up events, which are
//! published after the current one.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use common::{AggregateId, CartId, Money, OrderId, OrderSetId, PaymentCollectionId, PayoutId};
use domain::WebhookAction;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Events consumed and produced by the marketplace core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum MarketplaceEvent {
    #[serde(rename = "checkout.completed")]
    CheckoutCompleted { cart_id: CartId },

    #[serde(rename = "payment.captured")]
    PaymentCaptured {
        payment_id: String,
        payment_collection_id: PaymentCollectionId,
    },

    /// `refund_id` deduplicates redelivered requests; one is generated when absent.
    #[serde(rename = "payment.refund_requested")]
    RefundRequested {
        split_payment_id: AggregateId,
        #[serde(default)]
        refund_id: Option<String>,
        amount: Money,
    },

    /// `account_id` is the account's id at the payout provider.
    #[serde(rename = "payout_account.webhook")]
    PayoutAccountWebhook {
        action: WebhookAction,
        account_id: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    #[serde(rename = "order_set.placed")]
    OrderSetPlaced {
        order_set_id: OrderSetId,
        order_ids: Vec<OrderId>,
    },

    #[serde(rename = "payout.reversal_created")]
    PayoutReversalCreated { payout_id: PayoutId, amount: Money },

    #[serde(rename = "commission.finalized")]
    CommissionFinalized {
        order_id: OrderId,
        total_commission: Money,
    },
}

impl MarketplaceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketplaceEvent::CheckoutCompleted { .. } => "checkout.completed",
            MarketplaceEvent::PaymentCaptured { .. } => "payment.captured",
            MarketplaceEvent::RefundRequested { .. } => "payment.refund_requested",
            MarketplaceEvent::PayoutAccountWebhook { .. } => "payout_account.webhook",
            MarketplaceEvent::OrderSetPlaced { .. } => "order_set.placed",
            MarketplaceEvent::PayoutReversalCreated { .. } => "payout.reversal_created",
            MarketplaceEvent::CommissionFinalized { .. } => "commission.finalized",
        }
    }
}

type Handler = Arc<
    dyn Fn(MarketplaceEvent) -> BoxFuture<'static, Result<Vec<MarketplaceEvent>, SagaError>>
        + Send
        + Sync,
>;

/// Routes published events to their subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<HashMap<&'static str, Vec<Handler>>>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// Publishes `event` and every follow-up event its handlers return.
    ///
    /// Handlers of one event run in registration order. The first error
    /// stops publishing and is returned; events already handled stay
    /// handled, and a redelivery is deduplicated by the workflows' keys.
    /// Returns every event published, in order.
    #[tracing::instrument(skip(self, event), fields(event = event.name()))]
    pub async fn publish(
        &self,
        event: MarketplaceEvent,
    ) -> Result<Vec<MarketplaceEvent>, SagaError> {
        let mut queue = VecDeque::from([event]);
        let mut published = Vec::new();

        while let Some(event) = queue.pop_front() {
            let name = event.name();
            metrics::counter!("events_published_total", "event" => name).increment(1);
            published.push(event.clone());

            let Some(handlers) = self.handlers.get(name) else {
                tracing::debug!(event = name, "no subscribers");
                continue;
            };
            for handler in handlers {
                let follow_ups = handler(event.clone()).await.inspect_err(|error| {
                    tracing::warn!(event = name, %error, "event handler failed");
                })?;
                queue.extend(follow_ups);
            }
        }

        Ok(published)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct EventBusBuilder {
    handlers: HashMap<&'static str, Vec<Handler>>,
}

impl EventBusBuilder {
    pub fn subscribe<F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(MarketplaceEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<MarketplaceEvent>, SagaError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers.entry(name).or_default().push(handler);
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            handlers: Arc::new(self.handlers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event: MarketplaceEvent = serde_json::from_value(json!({
            "name": "payment.refund_requested",
            "data": {
                "split_payment_id": "5f0c6a52-2d0e-4a43-9d7e-2a7f6c1b9e10",
                "amount": { "amount": "20", "currency": "usd" }
            }
        }))
        .unwrap();
        match &event {
            MarketplaceEvent::RefundRequested {
                refund_id, amount, ..
            } => {
                assert!(refund_id.is_none());
                assert_eq!(amount.amount, dec!(20));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(event.name(), "payment.refund_requested");

        let webhook: MarketplaceEvent = serde_json::from_value(json!({
            "name": "payout_account.webhook",
            "data": { "action": "account_authorized", "account_id": "acct_1" }
        }))
        .unwrap();
        assert_eq!(webhook.name(), "payout_account.webhook");
    }

    #[tokio::test]
    async fn test_follow_ups_and_ordering() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let set_id = OrderSetId::new();

        let bus = EventBus::builder()
            .subscribe("checkout.completed", move |_| {
                let order = Arc::clone(&first);
                async move {
                    order.lock().push("first");
                    Ok(vec![MarketplaceEvent::OrderSetPlaced {
                        order_set_id: set_id,
                        order_ids: vec![],
                    }])
                }
            })
            .subscribe("checkout.completed", move |_| {
                let order = Arc::clone(&second);
                async move {
                    order.lock().push("second");
                    Ok(vec![])
                }
            })
            .build();

        let published = bus
            .publish(MarketplaceEvent::CheckoutCompleted {
                cart_id: CartId::new(),
            })
            .await
            .unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].name(), "order_set.placed");
        assert_eq!(bus.subscriber_count("checkout.completed"), 2);

        let again = bus
            .publish(MarketplaceEvent::CheckoutCompleted {
                cart_id: CartId::new(),
            })
            .await
            .unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(*order.lock(), vec!["first", "second", "first", "second"]);
    }

    #[tokio::test]
    async fn test_first_error_stops_publishing() {
        let later_ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&later_ran);
        let bus = EventBus::builder()
            .subscribe("payment.captured", |_| async {
                Err(SagaError::Validation("bad capture".into()))
            })
            .subscribe("payment.captured", move |_| {
                let flag = Arc::clone(&flag);
                async move {
                    *flag.lock() = true;
                    Ok(vec![])
                }
            })
            .build();

        let err = bus
            .publish(MarketplaceEvent::PaymentCaptured {
                payment_id: "pay_1".into(),
                payment_collection_id: PaymentCollectionId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
        assert!(!*later_ran.lock());
    }
}
