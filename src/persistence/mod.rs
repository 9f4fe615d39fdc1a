// ============================================================================
// Persistence - repository implementations
// ============================================================================

pub mod memory;
pub mod schema;
pub mod scylla_repos;

pub use memory::{InMemoryCoupons, InMemoryInventory, InMemoryReconciliationLog};
pub use schema::{ensure_schema, ORDER_EVENTS_TABLE, WALLET_EVENTS_TABLE};
pub use scylla_repos::{ScyllaCoupons, ScyllaInventory, ScyllaReconciliationLog};
