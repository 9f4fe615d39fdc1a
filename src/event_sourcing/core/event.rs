use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// ============================================================================
// Event Envelope - Event Metadata
// ============================================================================
//
// Wraps domain events with the metadata the store persists alongside them.
// The correlation id ties together every event written while serving one
// request (order settlement, wallet credit, compensations).
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    /// Who triggered this event
    pub user_id: Option<Uuid>,

    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_name().to_string(),
            event_version: E::event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }
}

/// Wrap a batch of freshly decided events, numbering them after `expected_version`.
pub fn wrap_events<E: DomainEvent>(
    aggregate_id: Uuid,
    expected_version: i64,
    events: Vec<E>,
    correlation_id: Uuid,
    user_id: Option<Uuid>,
) -> Vec<EventEnvelope<E>> {
    events
        .into_iter()
        .zip(expected_version + 1..)
        .map(|(event, seq)| {
            let envelope = EventEnvelope::new(aggregate_id, seq, event, correlation_id);
            match user_id {
                Some(user_id) => envelope.with_user(user_id),
                None => envelope,
            }
        })
        .collect()
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All domain events implement this trait to be used with the event store.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Name of the concrete variant, stored in the `event_type` column.
    fn event_name(&self) -> &'static str;

    fn event_version() -> i32 where Self: Sized { 1 }
}

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub fn deserialize_event<E: for<'de> Deserialize<'de>>(json: &str) -> Result<E, serde_json::Error> {
    serde_json::from_str(json)
}

// ============================================================================
// Tests
// ============================================================================
