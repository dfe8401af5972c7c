use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, validate_events_for_append},
};

/// In-memory event store.
///
/// Keeps the log in append order behind a single lock, so an append's version
/// check and write happen atomically.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Simulates an outage: while set, every call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

fn current_version(events: &[EventEnvelope], aggregate_id: AggregateId) -> Version {
    events
        .iter()
        .filter(|e| e.aggregate_id == aggregate_id)
        .map(|e| e.version)
        .max()
        .unwrap_or(Version::initial())
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        self.check_available()?;
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id;
        let first_new_version = events[0].version;

        let mut store = self.events.write().await;
        let current = current_version(&store, aggregate_id);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        // Versions are unique per aggregate even without an expected version.
        if first_new_version != current.next() {
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let last_version = events.last().map(|e| e.version).unwrap_or(current);
        tracing::trace!(%aggregate_id, count = events.len(), %last_version, "events appended");
        store.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.check_available()?;
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        self.check_available()?;
        let store = self.events.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(store
            .iter()
            .filter(|e| query.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        self.check_available()?;
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStoreExt;

    fn create_test_event(
        aggregate_id: AggregateId,
        version: Version,
        event_type: &str,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("PayoutAccount")
            .event_type(event_type)
            .version(version)
            .payload_raw(serde_json::json!({"type": event_type, "data": {"seller_id": "s1"}}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_multiple_events() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let events = vec![
            create_test_event(aggregate_id, Version::new(1), "PayoutAccountCreated"),
            create_test_event(aggregate_id, Version::new(2), "AccountActivated"),
            create_test_event(aggregate_id, Version::new(3), "PayoutCreated"),
        ];

        let version = store
            .append(events, AppendOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(version, Version::new(3));

        let stored = store.get_events_for_aggregate(aggregate_id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "PayoutAccountCreated")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        // A second writer that loaded the aggregate before the first append.
        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "AccountActivated")],
                AppendOptions::expect_new(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.kind(), common::ErrorKind::Conflict);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_version_rejected_without_expectation() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "E1")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "E2")],
                AppendOptions::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn empty_append_is_invalid() {
        let store = InMemoryEventStore::new();
        let result = store.append(vec![], AppendOptions::new()).await;
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[tokio::test]
    async fn query_by_payload_and_find_ids() {
        let store = InMemoryEventStore::new();
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();

        store
            .append(
                vec![
                    create_test_event(id1, Version::new(1), "PayoutAccountCreated"),
                    create_test_event(id1, Version::new(2), "AccountActivated"),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_event(id2, Version::first(), "PayoutAccountCreated")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let query = EventQuery::for_event_type("PayoutAccountCreated")
            .payload_eq("/data/seller_id", "s1");
        let ids = store.find_aggregate_ids(query).await.unwrap();
        assert_eq!(ids, vec![id1, id2]);

        let limited = store
            .query_events(EventQuery::new().aggregate_id(id1).offset(1).limit(5))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].event_type, "AccountActivated");
    }

    #[tokio::test]
    async fn unavailable_store_reports_transient_error() {
        let store = InMemoryEventStore::new();
        store.set_unavailable(true);

        let err = store
            .get_aggregate_version(AggregateId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Transient);

        store.set_unavailable(false);
        assert!(
            !store
                .aggregate_exists(AggregateId::new())
                .await
                .unwrap()
        );
    }
}
