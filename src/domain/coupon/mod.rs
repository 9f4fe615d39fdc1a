// ============================================================================
// Coupon Domain
// ============================================================================
//
// Coupon definitions, the discount rules shared by checkout and
// cancellation, the snapshot stored on orders and the repository seam.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod pricing;
pub mod repository;

pub use value_objects::*;
pub use errors::*;
pub use pricing::*;
pub use repository::*;
