use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::utils::money::{percent_of, round_money};
use super::errors::CouponError;
use super::value_objects::{AppliedCoupon, Coupon, CouponCode, CouponStatus};

// ============================================================================
// Coupon Rules
// ============================================================================
//
// The same discount function is used when the coupon is priced at checkout
// and when a partial cancellation recomputes the discount on the remaining
// subtotal, so the optional cap applies identically in both places.
//
// ============================================================================

/// Admin input for a new coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount: Decimal,
    pub minimum_amount: Decimal,
    pub max_discount: Option<Decimal>,
    pub usage_limit: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn create(input: NewCoupon, now: DateTime<Utc>) -> Result<Self, CouponError> {
        let code = CouponCode::parse(&input.code)?;

        if input.discount <= Decimal::ZERO || input.discount > Decimal::ONE_HUNDRED {
            return Err(CouponError::InvalidDiscount(input.discount));
        }
        if input.minimum_amount < Decimal::ZERO {
            return Err(CouponError::InvalidAmount {
                field: "minimum_amount",
                value: input.minimum_amount,
            });
        }
        if let Some(cap) = input.max_discount {
            if cap <= Decimal::ZERO {
                return Err(CouponError::InvalidAmount {
                    field: "max_discount",
                    value: cap,
                });
            }
        }
        if input.usage_limit == 0 {
            return Err(CouponError::InvalidUsageLimit);
        }

        Ok(Self {
            code,
            discount: input.discount,
            minimum_amount: input.minimum_amount,
            max_discount: input.max_discount,
            usage_limit: input.usage_limit,
            status: CouponStatus::Active,
            expires_at: input.expires_at,
            created_at: now,
        })
    }

    /// Whether `subtotal` still meets the minimum order amount.
    pub fn qualifies(&self, subtotal: Decimal) -> bool {
        subtotal >= self.minimum_amount
    }

    /// Check that `user` may redeem this coupon on a cart worth `subtotal`.
    pub fn validate_for(
        &self,
        subtotal: Decimal,
        used_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CouponError> {
        if self.status != CouponStatus::Active {
            return Err(CouponError::Inactive(self.code.to_string()));
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(CouponError::Expired(self.code.to_string()));
        }
        if used_count >= self.usage_limit {
            return Err(CouponError::UsageLimitReached(self.code.to_string()));
        }
        if !self.qualifies(subtotal) {
            return Err(CouponError::BelowMinimum {
                minimum: self.minimum_amount,
                subtotal,
            });
        }
        Ok(())
    }

    /// `subtotal × discount%`, capped by `max_discount` and by the subtotal itself.
    pub fn calculate_discount(&self, subtotal: Decimal) -> Decimal {
        let mut amount = percent_of(subtotal, self.discount);
        if let Some(cap) = self.max_discount {
            amount = amount.min(cap);
        }
        round_money(amount.min(subtotal).max(Decimal::ZERO))
    }

    /// Validate and price the coupon for a cart.
    pub fn apply(
        &self,
        subtotal: Decimal,
        used_count: u32,
        now: DateTime<Utc>,
    ) -> Result<AppliedCoupon, CouponError> {
        self.validate_for(subtotal, used_count, now)?;

        Ok(AppliedCoupon {
            code: self.code.to_string(),
            discount: self.discount,
            discount_amount: self.calculate_discount(subtotal),
            subtotal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn save20(max_discount: Option<Decimal>) -> Coupon {
        Coupon::create(
            NewCoupon {
                code: "save20".to_string(),
                discount: Decimal::from(20),
                minimum_amount: Decimal::from(1000),
                max_discount,
                usage_limit: 1,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_normalizes_and_activates() {
        let coupon = save20(None);
        assert_eq!(coupon.code.as_str(), "SAVE20");
        assert_eq!(coupon.status, CouponStatus::Active);
    }

    #[test]
    fn test_create_rejects_out_of_range_discount() {
        let result = Coupon::create(
            NewCoupon {
                code: "BIG".to_string(),
                discount: Decimal::from(120),
                minimum_amount: Decimal::ZERO,
                max_discount: None,
                usage_limit: 1,
                expires_at: None,
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(CouponError::InvalidDiscount(_))));
    }

    #[test]
    fn test_discount_uncapped_and_capped() {
        assert_eq!(save20(None).calculate_discount(Decimal::from(1500)), Decimal::from(300));
        assert_eq!(
            save20(Some(Decimal::from(250))).calculate_discount(Decimal::from(1500)),
            Decimal::from(250)
        );
    }

    #[test]
    fn test_validate_below_minimum() {
        let result = save20(None).validate_for(Decimal::from(999), 0, Utc::now());
        assert!(matches!(result, Err(CouponError::BelowMinimum { .. })));
    }

    #[test]
    fn test_validate_usage_limit() {
        let result = save20(None).validate_for(Decimal::from(1500), 1, Utc::now());
        assert!(matches!(result, Err(CouponError::UsageLimitReached(_))));
    }

    #[test]
    fn test_validate_expired_and_inactive() {
        let now = Utc::now();
        let mut coupon = save20(None);
        coupon.expires_at = Some(now - Duration::days(1));
        assert!(matches!(
            coupon.validate_for(Decimal::from(1500), 0, now),
            Err(CouponError::Expired(_))
        ));

        let mut coupon = save20(None);
        coupon.status = CouponStatus::Inactive;
        assert!(matches!(
            coupon.validate_for(Decimal::from(1500), 0, now),
            Err(CouponError::Inactive(_))
        ));
    }

    #[test]
    fn test_apply_returns_preview() {
        let applied = save20(None).apply(Decimal::from(1200), 0, Utc::now()).unwrap();
        assert_eq!(applied.code, "SAVE20");
        assert_eq!(applied.discount_amount, Decimal::from(240));
        assert_eq!(applied.subtotal, Decimal::from(1200));
    }
}
