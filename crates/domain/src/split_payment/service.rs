//! Split payment service.

use common::{AggregateId, Money, OrderId, PaymentCollectionId, SellerId};
use event_store::{EventQuery, EventStore, EventStoreExt};

use super::{SplitOrderPayment, SplitPaymentError};
use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

/// Service for recording captures and refunds against split payments.
///
/// Mutations reload and retry on version conflicts, so concurrent events for
/// the same payment are applied one after the other.
pub struct SplitPaymentService<S: EventStore> {
    handler: CommandHandler<S, SplitOrderPayment>,
}

impl<S: EventStore> SplitPaymentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    #[tracing::instrument(skip(self, authorized), fields(amount = %authorized))]
    pub async fn create(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
        payment_collection_id: PaymentCollectionId,
        authorized: Money,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        let id = SplitOrderPayment::id_for(order_id);
        self.handler
            .execute(id, |payment| {
                payment.create(
                    order_id,
                    seller_id,
                    payment_collection_id,
                    authorized.clone(),
                )
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn capture(
        &self,
        id: AggregateId,
        payment_id: &str,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        self.execute_existing(id, |payment| payment.capture(payment_id))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revert_capture(
        &self,
        id: AggregateId,
        payment_id: &str,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        self.execute_existing(id, |payment| payment.revert_capture(payment_id))
            .await
    }

    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn refund(
        &self,
        id: AggregateId,
        refund_id: &str,
        amount: &Money,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        self.execute_existing(id, |payment| payment.refund(refund_id, amount))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revert_refund(
        &self,
        id: AggregateId,
        refund_id: &str,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        self.execute_existing(id, |payment| payment.revert_refund(refund_id))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: AggregateId,
        reason: &str,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError> {
        self.execute_existing(id, |payment| payment.cancel(reason))
            .await
    }

    pub async fn get(&self, id: AggregateId) -> Result<Option<SplitOrderPayment>, DomainError> {
        self.handler.load_existing(id).await
    }

    pub async fn get_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<SplitOrderPayment>, DomainError> {
        self.get(SplitOrderPayment::id_for(order_id)).await
    }

    /// All split payments of a parent payment collection, in creation order.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_collection(
        &self,
        payment_collection_id: PaymentCollectionId,
    ) -> Result<Vec<SplitOrderPayment>, DomainError> {
        self.list_created_with("/data/payment_collection_id", payment_collection_id.to_string())
            .await
    }

    /// All split payments of a seller, in creation order.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_seller(
        &self,
        seller_id: SellerId,
    ) -> Result<Vec<SplitOrderPayment>, DomainError> {
        self.list_created_with("/data/seller_id", seller_id.to_string())
            .await
    }

    async fn list_created_with(
        &self,
        pointer: &str,
        value: String,
    ) -> Result<Vec<SplitOrderPayment>, DomainError> {
        let query = EventQuery::for_event_type("SplitPaymentCreated")
            .aggregate_type(SplitOrderPayment::aggregate_type())
            .payload_eq(pointer, value);
        let ids = self.handler.store().find_aggregate_ids(query).await?;

        let mut payments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(payment) = self.handler.load_existing(id).await? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }

    async fn execute_existing<F>(
        &self,
        id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<SplitOrderPayment>, DomainError>
    where
        F: Fn(&SplitOrderPayment) -> Result<Vec<super::SplitPaymentEvent>, SplitPaymentError>,
    {
        let result = self.handler.execute_with_retry(id, command_fn).await;
        match result {
            Err(DomainError::SplitPayment(SplitPaymentError::NotInitialized)) => {
                Err(DomainError::not_found(SplitOrderPayment::aggregate_type(), id))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split_payment::SplitPaymentStatus;
    use event_store::InMemoryEventStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn lists_payments_of_a_collection() {
        let service = SplitPaymentService::new(InMemoryEventStore::new());
        let collection = PaymentCollectionId::new();
        let other = PaymentCollectionId::new();

        let a = OrderId::new();
        let b = OrderId::new();
        service
            .create(a, SellerId::new(), collection, Money::new(dec!(100), "usd"))
            .await
            .unwrap();
        service
            .create(b, SellerId::new(), collection, Money::new(dec!(50), "usd"))
            .await
            .unwrap();
        service
            .create(OrderId::new(), SellerId::new(), other, Money::new(dec!(1), "usd"))
            .await
            .unwrap();

        let payments = service.list_by_collection(collection).await.unwrap();
        let orders: Vec<_> = payments.iter().filter_map(|p| p.order_id()).collect();
        assert_eq!(orders, vec![a, b]);
    }

    #[tokio::test]
    async fn lists_payments_of_a_seller() {
        let service = SplitPaymentService::new(InMemoryEventStore::new());
        let seller = SellerId::new();

        let first = OrderId::new();
        let second = OrderId::new();
        service
            .create(first, seller, PaymentCollectionId::new(), Money::new(dec!(10), "usd"))
            .await
            .unwrap();
        service
            .create(OrderId::new(), SellerId::new(), PaymentCollectionId::new(), Money::new(dec!(5), "usd"))
            .await
            .unwrap();
        service
            .create(second, seller, PaymentCollectionId::new(), Money::new(dec!(20), "usd"))
            .await
            .unwrap();

        let payments = service.list_by_seller(seller).await.unwrap();
        let orders: Vec<_> = payments.iter().filter_map(|p| p.order_id()).collect();
        assert_eq!(orders, vec![first, second]);
    }

    #[tokio::test]
    async fn capture_and_refund_through_the_store() {
        let service = SplitPaymentService::new(InMemoryEventStore::new());
        let order = OrderId::new();
        let id = service
            .create(order, SellerId::new(), PaymentCollectionId::new(), Money::new(dec!(100), "usd"))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        service.capture(id, "pay_1").await.unwrap();
        let again = service.capture(id, "pay_1").await.unwrap();
        assert!(again.events.is_empty());

        service
            .refund(id, "re_1", &Money::new(dec!(20), "usd"))
            .await
            .unwrap();

        let payment = service.get_for_order(order).await.unwrap().unwrap();
        assert_eq!(payment.status(), SplitPaymentStatus::Captured);
        assert_eq!(payment.captured().amount, dec!(100));
        assert_eq!(payment.refunded().amount, dec!(20));
    }

    #[tokio::test]
    async fn creating_twice_conflicts_and_missing_is_not_found() {
        let service = SplitPaymentService::new(InMemoryEventStore::new());
        let order = OrderId::new();
        let collection = PaymentCollectionId::new();
        service
            .create(order, SellerId::new(), collection, Money::new(dec!(1), "usd"))
            .await
            .unwrap();

        let err = service
            .create(order, SellerId::new(), collection, Money::new(dec!(1), "usd"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Conflict);

        let err = service.capture(AggregateId::new(), "pay_1").await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
    }
}
