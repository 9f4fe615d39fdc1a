use uuid::Uuid;

use crate::domain::order::{OrderAggregate, OrderCommand, OrderCommandHandler};
use crate::event_sourcing::StoreError;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};
use super::errors::ServiceError;

/// Who is acting on an order. Customers only see their own orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Admin(Uuid),
}

impl Actor {
    pub fn id(self) -> Uuid {
        match self {
            Actor::Customer(id) | Actor::Admin(id) => id,
        }
    }
}

/// Load an order, hiding orders that belong to someone else.
pub async fn load_for(
    orders: &OrderCommandHandler,
    order_id: Uuid,
    actor: Actor,
) -> Result<OrderAggregate, ServiceError> {
    let order = orders.load(order_id).await?;
    match actor {
        Actor::Customer(user_id) if order.user_id != user_id => Err(ServiceError::OrderNotFound(order_id)),
        _ => Ok(order),
    }
}

/// Load → decide → append for commands without side effects, retried on
/// version conflicts.
pub async fn run_command(
    orders: &OrderCommandHandler,
    retry: &RetryConfig,
    metrics: &Metrics,
    operation: &str,
    order_id: Uuid,
    actor: Actor,
    command: OrderCommand,
) -> Result<OrderAggregate, ServiceError> {
    retry_on_transient(retry, operation, move |_attempt| {
        let command = command.clone();
        async move {
            let order = load_for(orders, order_id, actor).await?;
            let decision = OrderCommandHandler::decide_on(order, &command)?;
            match orders.commit(&decision, Uuid::new_v4(), Some(actor.id())).await {
                Ok(_) => Ok(decision.order),
                Err(err) => {
                    let err = ServiceError::from(err);
                    if matches!(err, ServiceError::Store(StoreError::ConcurrencyConflict { .. })) {
                        metrics.record_conflict(operation);
                    }
                    Err(err)
                }
            }
        }
    })
    .await
}
