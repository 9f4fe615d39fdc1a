use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::coupon::{Coupon, CouponCode, CouponError, CouponRepository, CouponStatus, NewCoupon};
use crate::domain::inventory::{InventoryError, InventoryRepository, Product};
use crate::domain::reconciliation::{ReconciliationEntry, ReconciliationLog};
use super::errors::ServiceError;

/// Catalog and coupon administration, plus the operator view of the
/// reconciliation queue.
pub struct AdminService {
    coupons: Arc<dyn CouponRepository>,
    inventory: Arc<dyn InventoryRepository>,
    reconciliation: Arc<dyn ReconciliationLog>,
}

impl AdminService {
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        inventory: Arc<dyn InventoryRepository>,
        reconciliation: Arc<dyn ReconciliationLog>,
    ) -> Self {
        Self {
            coupons,
            inventory,
            reconciliation,
        }
    }

    pub async fn create_coupon(&self, input: NewCoupon) -> Result<Coupon, ServiceError> {
        let coupon = Coupon::create(input, Utc::now())?;
        if !self.coupons.insert(&coupon).await? {
            return Err(CouponError::AlreadyExists(coupon.code.to_string()).into());
        }

        tracing::info!(
            code = %coupon.code,
            discount = %coupon.discount,
            minimum_amount = %coupon.minimum_amount,
            usage_limit = coupon.usage_limit,
            "🏷️ Coupon created"
        );
        Ok(coupon)
    }

    pub async fn set_coupon_status(&self, code: &str, status: CouponStatus) -> Result<(), ServiceError> {
        let code = CouponCode::parse(code)?;
        if !self.coupons.set_status(&code, status).await? {
            return Err(CouponError::NotFound(code.to_string()).into());
        }

        tracing::info!(code = %code, status = ?status, "Coupon status changed");
        Ok(())
    }

    pub async fn add_product(&self, name: &str, price: Decimal, stock: i64) -> Result<Product, ServiceError> {
        let product = Product::new(name, price, stock)?;
        self.inventory
            .add_product(&product)
            .await
            .map_err(InventoryError::from)?;

        tracing::info!(product_id = %product.id, name = %product.name, stock = product.stock, "Product added");
        Ok(product)
    }

    pub async fn pending_reconciliation(&self, limit: usize) -> Result<Vec<ReconciliationEntry>, ServiceError> {
        Ok(self.reconciliation.pending(limit).await?)
    }
}
