use async_trait::async_trait;
use uuid::Uuid;

use crate::event_sourcing::StoreError;
use super::value_objects::{Coupon, CouponCode, CouponStatus};

/// Coupon definitions plus per-user redemption counters.
///
/// Counters are adjusted with atomic increments, never read-modify-write.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError>;

    /// Insert a new coupon. Returns `false` when the code is already taken.
    async fn insert(&self, coupon: &Coupon) -> Result<bool, StoreError>;

    /// Returns `false` when the coupon does not exist.
    async fn set_status(&self, code: &CouponCode, status: CouponStatus) -> Result<bool, StoreError>;

    async fn used_count(&self, code: &CouponCode, user_id: Uuid) -> Result<u32, StoreError>;

    /// Returns the counter value after the increment.
    async fn adjust_usage(&self, code: &CouponCode, user_id: Uuid, delta: i64) -> Result<i64, StoreError>;
}
