use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::{load_aggregate, wrap_events, Aggregate, EventStore, LoadError, StoreError};
use crate::utils::IsTransient;

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store
//
// `decide` and `commit` are split so the cancellation saga can run its side
// effects between deciding a settlement and persisting it.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderCommandError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Domain(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Corrupt order stream: {0}")]
    Corrupt(String),
}

impl IsTransient for OrderCommandError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderCommandError::Store(e) if e.is_transient())
    }
}

impl From<LoadError<OrderError>> for OrderCommandError {
    fn from(err: LoadError<OrderError>) -> Self {
        match err {
            LoadError::Store(e) => OrderCommandError::Store(e),
            LoadError::Replay(e) => OrderCommandError::Corrupt(e.to_string()),
        }
    }
}

/// Events decided against a loaded order, not yet persisted
#[derive(Debug, Clone)]
pub struct Decision {
    /// State before the events
    pub expected_version: i64,
    pub events: Vec<OrderEvent>,
    /// State after the events, as it will look once committed
    pub order: OrderAggregate,
}

pub struct OrderCommandHandler {
    event_store: Arc<dyn EventStore<OrderEvent>>,
}

impl OrderCommandHandler {
    pub fn new(event_store: Arc<dyn EventStore<OrderEvent>>) -> Self {
        Self { event_store }
    }

    pub async fn load(&self, order_id: Uuid) -> Result<OrderAggregate, OrderCommandError> {
        let order = load_aggregate::<OrderAggregate, _>(self.event_store.as_ref(), order_id).await?;
        order.ok_or(OrderCommandError::NotFound(order_id))
    }

    /// Run a command against the current state without persisting anything
    pub async fn decide(&self, order_id: Uuid, command: &OrderCommand) -> Result<Decision, OrderCommandError> {
        let current = match command {
            OrderCommand::Place { .. } => {
                match load_aggregate::<OrderAggregate, _>(self.event_store.as_ref(), order_id).await? {
                    Some(existing) => existing,
                    None => OrderAggregate::unplaced(order_id),
                }
            }
            _ => self.load(order_id).await?,
        };

        Self::decide_on(current, command)
    }

    pub fn decide_on(current: OrderAggregate, command: &OrderCommand) -> Result<Decision, OrderCommandError> {
        let expected_version = current.version();
        let events = current.handle_command(command)?;

        let mut order = current;
        order.apply_all(&events)?;

        Ok(Decision {
            expected_version,
            events,
            order,
        })
    }

    /// Append decided events at the version they were decided against
    pub async fn commit(
        &self,
        decision: &Decision,
        correlation_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<i64, OrderCommandError> {
        if decision.events.is_empty() {
            return Ok(decision.expected_version);
        }

        let order_id = decision.order.aggregate_id();
        let envelopes = wrap_events(
            order_id,
            decision.expected_version,
            decision.events.clone(),
            correlation_id,
            user_id,
        );

        let new_version = self
            .event_store
            .append_events(order_id, decision.expected_version, envelopes)
            .await?;

        tracing::debug!(
            order_id = %order_id,
            version = new_version,
            events = decision.events.len(),
            "Order events committed"
        );

        Ok(new_version)
    }

    /// Decide and commit in one go
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        correlation_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<OrderAggregate, OrderCommandError> {
        let decision = self.decide(order_id, &command).await?;
        self.commit(&decision, correlation_id, user_id).await?;
        Ok(decision.order)
    }
}
