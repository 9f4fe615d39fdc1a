use rust_decimal::Decimal;

// ============================================================================
// Coupon Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon code cannot be empty")]
    EmptyCode,

    #[error("Invalid coupon code: {0}")]
    InvalidCode(String),

    #[error("Coupon not found: {0}")]
    NotFound(String),

    #[error("Coupon already exists: {0}")]
    AlreadyExists(String),

    #[error("Coupon {0} is not active")]
    Inactive(String),

    #[error("Coupon {0} has expired")]
    Expired(String),

    #[error("Coupon {0} usage limit reached")]
    UsageLimitReached(String),

    #[error("Minimum order amount for this coupon is {minimum}, cart subtotal is {subtotal}")]
    BelowMinimum { minimum: Decimal, subtotal: Decimal },

    #[error("Discount must be greater than 0 and at most 100, got {0}")]
    InvalidDiscount(Decimal),

    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount { field: &'static str, value: Decimal },

    #[error("Usage limit must be at least 1")]
    InvalidUsageLimit,
}
