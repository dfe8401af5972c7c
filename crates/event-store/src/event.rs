use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError};

/// Metadata key carrying the idempotency key of the run that produced an event.
pub const CORRELATION_KEY: &str = "correlation_id";

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version number for an aggregate, used for optimistic concurrency control.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on an aggregate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted event with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// The type of the event (e.g., "SplitPaymentCaptured").
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "SplitOrderPayment", "PayoutAccount").
    pub aggregate_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Returns the correlation id recorded in the metadata, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_KEY).and_then(|v| v.as_str())
    }

    /// Deserializes the payload into a typed event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventStoreError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Tags the event with the idempotency key of the producing run.
    pub fn correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.metadata(
            CORRELATION_KEY,
            serde_json::Value::String(correlation_id.into()),
        )
    }

    /// Builds the envelope, failing if a required field is missing.
    pub fn build(self) -> Result<EventEnvelope, EventStoreError> {
        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self
                .event_type
                .ok_or(EventStoreError::InvalidEnvelope("event_type"))?,
            aggregate_id: self
                .aggregate_id
                .ok_or(EventStoreError::InvalidEnvelope("aggregate_id"))?,
            aggregate_type: self
                .aggregate_type
                .ok_or(EventStoreError::InvalidEnvelope("aggregate_type"))?,
            version: self
                .version
                .ok_or(EventStoreError::InvalidEnvelope("version"))?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self
                .payload
                .ok_or(EventStoreError::InvalidEnvelope("payload"))?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn builder_sets_all_fields() {
        let aggregate_id = AggregateId::new();
        let payload = serde_json::json!({"type": "SplitPaymentCaptured", "data": {}});

        let envelope = EventEnvelope::builder()
            .event_type("SplitPaymentCaptured")
            .aggregate_id(aggregate_id)
            .aggregate_type("SplitOrderPayment")
            .version(Version::first())
            .payload_raw(payload.clone())
            .correlation_id("capture:pay_1")
            .build()
            .unwrap();

        assert_eq!(envelope.event_type, "SplitPaymentCaptured");
        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.version, Version::first());
        assert_eq!(envelope.payload, payload);
        assert_eq!(envelope.correlation_id(), Some("capture:pay_1"));
    }

    #[test]
    fn builder_reports_missing_field() {
        let result = EventEnvelope::builder()
            .event_type("Anything")
            .aggregate_id(AggregateId::new())
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build();

        assert!(matches!(
            result,
            Err(EventStoreError::InvalidEnvelope("aggregate_type"))
        ));
    }

    #[test]
    fn decode_typed_payload() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Payload {
            amount: String,
        }

        let envelope = EventEnvelope::builder()
            .event_type("Test")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Test")
            .version(Version::first())
            .payload_raw(serde_json::json!({"amount": "10.00"}))
            .build()
            .unwrap();

        let payload: Payload = envelope.decode().unwrap();
        assert_eq!(payload.amount, "10.00");
    }
}
