use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::CouponError;

// ============================================================================
// Coupon Value Objects
// ============================================================================

const MAX_CODE_LEN: usize = 32;

/// Coupon code, trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn parse(raw: &str) -> Result<Self, CouponError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            return Err(CouponError::EmptyCode);
        }
        if code.len() > MAX_CODE_LEN
            || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CouponError::InvalidCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponStatus {
    Active,
    Inactive,
}

/// Coupon definition as created by an admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    /// Percentage, 0 < discount <= 100
    pub discount: Decimal,
    /// Subtotal floor below which the coupon does not apply
    pub minimum_amount: Decimal,
    /// Optional cap on the discount amount
    #[serde(alias = "max_amount")]
    pub max_discount: Option<Decimal>,
    /// Redemptions allowed per user
    pub usage_limit: u32,
    pub status: CouponStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Coupon as recorded on an order at checkout.
///
/// Decoupled from the live definition; an invalidated coupon keeps the
/// snapshot with `code: None` and a zero discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: Option<String>,
    pub discount_amount: Decimal,
}

impl CouponSnapshot {
    pub fn applied(code: &CouponCode, discount_amount: Decimal) -> Self {
        Self {
            code: Some(code.as_str().to_string()),
            discount_amount,
        }
    }

    pub fn cleared() -> Self {
        Self {
            code: None,
            discount_amount: Decimal::ZERO,
        }
    }

    /// True when the snapshot still discounts the order.
    pub fn is_active(&self) -> bool {
        self.code.is_some() && self.discount_amount > Decimal::ZERO
    }
}

/// Result of applying a coupon to a cart before checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}
