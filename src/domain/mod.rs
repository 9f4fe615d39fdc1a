// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Event-sourced aggregates (order, wallet) each have their own subdirectory
// with value objects, events, commands, errors and the aggregate itself.
// Coupons and inventory are plain records behind repository traits, since
// their only concurrent writes are counter increments.
//
// This layer is completely separate from the event sourcing infrastructure.
//
// ============================================================================

pub mod coupon;
pub mod inventory;
pub mod order;
pub mod reconciliation;
pub mod wallet;
