// ============================================================================
// Wallet Domain - per-user refund balance
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod value_objects;

pub use aggregate::WalletAggregate;
pub use errors::WalletError;
pub use events::*;
pub use ledger::{LedgerError, WalletLedger};
pub use value_objects::*;
