use async_trait::async_trait;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};
use crate::utils::IsTransient;

// ============================================================================
// Event Store - Repository for Events
// ============================================================================
//
// Responsibilities:
// 1. Append events to an aggregate's stream (append-only)
// 2. Load event history for aggregates
// 3. Enforce optimistic concurrency: an append only succeeds when the
//    stream is still at `expected_version`
//
// Backends: ScyllaDB (lightweight transactions) and in-memory.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Cannot append empty event list")]
    EmptyAppend,

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Append events to the stream of `aggregate_id`.
    /// Returns the new version number after appending.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, StoreError>;

    /// Load all events for an aggregate, ordered by sequence number
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, StoreError>;

    /// Current version of an aggregate (0 = no events)
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, StoreError>;

    /// Short backend name for health reporting
    fn backend_name(&self) -> &'static str;
}

/// Error raised while rebuilding an aggregate from a stored stream.
#[derive(Debug, thiserror::Error)]
pub enum LoadError<D: std::fmt::Debug + std::fmt::Display> {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Corrupt event stream: {0}")]
    Replay(D),
}

/// Load an aggregate from its events. `Ok(None)` when the stream is empty.
pub async fn load_aggregate<A, S>(store: &S, aggregate_id: Uuid) -> Result<Option<A>, LoadError<A::Error>>
where
    A: Aggregate,
    A::Event: DomainEvent,
    A::Error: std::fmt::Debug + std::fmt::Display,
    S: EventStore<A::Event> + ?Sized,
{
    let events = store.load_events(aggregate_id).await?;

    tracing::debug!(
        aggregate_id = %aggregate_id,
        event_count = events.len(),
        "Replaying aggregate from event store"
    );

    A::load_from_events(&events).map_err(LoadError::Replay)
}
