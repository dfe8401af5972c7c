use crate::{AggregateId, EventEnvelope, Version};

/// Matches events whose payload holds `value` at the JSON pointer `pointer`.
///
/// A relational backend evaluates this as `payload #> path = value`; the
/// in-memory store uses [`serde_json::Value::pointer`].
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFilter {
    pub pointer: String,
    pub value: serde_json::Value,
}

impl PayloadFilter {
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        payload.pointer(&self.pointer) == Some(&self.value)
    }
}

/// Builder for constructing event queries.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,

    pub aggregate_type: Option<String>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Filter by minimum version (inclusive).
    pub from_version: Option<Version>,

    /// Filter by maximum version (inclusive).
    pub to_version: Option<Version>,

    /// All of these must match the payload.
    pub payload_filters: Vec<PayloadFilter>,

    pub limit: Option<usize>,

    pub offset: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self {
            event_types: Some(vec![event_type.into()]),
            ..Default::default()
        }
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types = Some(vec![event_type.into()]);
        self
    }

    pub fn event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    pub fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    /// Requires the payload to hold `value` at `pointer` (e.g. `/data/seller_id`).
    pub fn payload_eq(mut self, pointer: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload_filters.push(PayloadFilter {
            pointer: pointer.into(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the envelope satisfies every filter of this query.
    /// Paging (`limit`/`offset`) is applied by the store.
    pub fn matches(&self, e: &EventEnvelope) -> bool {
        if let Some(id) = self.aggregate_id
            && e.aggregate_id != id
        {
            return false;
        }
        if let Some(ref agg_type) = self.aggregate_type
            && &e.aggregate_type != agg_type
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&e.event_type)
        {
            return false;
        }
        if let Some(from) = self.from_version
            && e.version < from
        {
            return false;
        }
        if let Some(to) = self.to_version
            && e.version > to
        {
            return false;
        }
        self.payload_filters.iter().all(|f| f.matches(&e.payload))
    }
}
