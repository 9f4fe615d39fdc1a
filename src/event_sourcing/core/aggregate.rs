use uuid::Uuid;
use super::event::EventEnvelope;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. Events represent facts that have already happened
// 4. Aggregates enforce business invariants
//
// Orders and wallets both implement this trait. The version of an aggregate
// is the sequence number of the last applied event and is what the event
// store checks on append.
//
// ============================================================================

/// Generic Aggregate trait - all event-sourced aggregates implement this
///
/// Type Parameters:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Create new aggregate from first event
    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Get current version (sequence number)
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Rebuild an aggregate from its ordered event history.
    ///
    /// Returns `Ok(None)` for an empty history.
    fn load_from_events(events: &[EventEnvelope<Self::Event>]) -> Result<Option<Self>, Self::Error> {
        let Some((first, rest)) = events.split_first() else {
            return Ok(None);
        };

        let mut aggregate = Self::apply_first_event(first.aggregate_id, &first.event_data)?;
        aggregate.set_version(first.sequence_number);

        for envelope in rest {
            aggregate.apply_event(&envelope.event_data)?;
            aggregate.set_version(envelope.sequence_number);
        }

        Ok(Some(aggregate))
    }

    /// Apply freshly decided events in memory, bumping the version for each.
    fn apply_all(&mut self, events: &[Self::Event]) -> Result<(), Self::Error> {
        for event in events {
            self.apply_event(event)?;
            let next = self.version() + 1;
            self.set_version(next);
        }
        Ok(())
    }
}
