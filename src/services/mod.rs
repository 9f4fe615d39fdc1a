// ============================================================================
// Application Services
// ============================================================================
//
// Orchestration over the domain aggregates and repositories: checkout,
// the cancellation/return saga and admin operations. Handlers in `api`
// call into these and never touch a store directly.
//
// ============================================================================

pub mod access;
pub mod admin;
pub mod cancellation;
pub mod checkout;
pub mod errors;
pub mod payment;

pub use access::Actor;
pub use admin::AdminService;
pub use cancellation::{CancellationEngine, CancellationOutcome, SettlementOptions};
pub use checkout::{CartLine, CheckoutService, PlaceOrder};
pub use errors::{ErrorKind, ServiceError};
pub use payment::{LocalGateway, PaymentGateway};
