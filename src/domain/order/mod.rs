// ============================================================================
// Order Domain - Business Logic for Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (LineItem, ItemStatus, OrderStatus, PaymentMethod)
// - Events (OrderPlaced, ItemsCancelled, ReturnAccepted, etc.)
// - Commands (Place, CancelItems, AcceptReturn, etc.)
// - Errors (OrderError enum)
// - Refund planning (proportional coupon re-adjustment)
// - Aggregate (OrderAggregate with business logic)
// - Command Handler (OrderCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod settlement;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
