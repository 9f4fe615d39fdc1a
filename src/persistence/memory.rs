use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponCode, CouponRepository, CouponStatus};
use crate::domain::inventory::{InventoryRepository, Product};
use crate::domain::reconciliation::{ReconciliationEntry, ReconciliationLog};
use crate::event_sourcing::StoreError;

// ============================================================================
// In-Memory Repositories
// ============================================================================
//
// Development (`--store memory`) and test counterparts of the Scylla
// repositories. Counter adjustments happen under a single write lock.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryInventory {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventory {
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }

    async fn add_product(&self, product: &Product) -> Result<(), StoreError> {
        self.products.write().await.insert(product.id, product.clone());
        Ok(())
    }

    async fn adjust_stock(&self, product_id: Uuid, delta: i64) -> Result<i64, StoreError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::backend(format!("no stock counter for product {product_id}")))?;
        product.stock += delta;
        Ok(product.stock)
    }
}

#[derive(Default)]
pub struct InMemoryCoupons {
    coupons: RwLock<HashMap<CouponCode, Coupon>>,
    usage: RwLock<HashMap<(CouponCode, Uuid), i64>>,
}

impl InMemoryCoupons {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponRepository for InMemoryCoupons {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        Ok(self.coupons.read().await.get(code).cloned())
    }

    async fn insert(&self, coupon: &Coupon) -> Result<bool, StoreError> {
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&coupon.code) {
            return Ok(false);
        }
        coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(true)
    }

    async fn set_status(&self, code: &CouponCode, status: CouponStatus) -> Result<bool, StoreError> {
        match self.coupons.write().await.get_mut(code) {
            Some(coupon) => {
                coupon.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn used_count(&self, code: &CouponCode, user_id: Uuid) -> Result<u32, StoreError> {
        let used = self
            .usage
            .read()
            .await
            .get(&(code.clone(), user_id))
            .copied()
            .unwrap_or(0);
        Ok(u32::try_from(used.max(0)).unwrap_or(u32::MAX))
    }

    async fn adjust_usage(&self, code: &CouponCode, user_id: Uuid, delta: i64) -> Result<i64, StoreError> {
        let mut usage = self.usage.write().await;
        let used = usage.entry((code.clone(), user_id)).or_insert(0);
        *used += delta;
        Ok(*used)
    }
}

#[derive(Default)]
pub struct InMemoryReconciliationLog {
    entries: Mutex<Vec<ReconciliationEntry>>,
}

impl InMemoryReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryReconciliationLog {
    async fn record(&self, entry: &ReconciliationEntry) -> Result<(), StoreError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>, StoreError> {
        Ok(self.entries.lock().await.iter().take(limit).cloned().collect())
    }
}
