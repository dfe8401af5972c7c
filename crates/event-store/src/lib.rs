//! Append-only event log.
//!
//! Split payments, payout accounts and saga instances are event-sourced: their
//! state is the fold of the events recorded here, and every append is guarded by
//! an expected version so concurrent writers to one aggregate cannot lose updates.

pub mod error;
pub mod event;
pub mod memory;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use query::{EventQuery, PayloadFilter};
pub use store::{AppendOptions, EventStore, EventStoreExt};
