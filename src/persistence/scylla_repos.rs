use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use scylla::client::session::Session;
use scylla::value::Counter;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponCode, CouponRepository, CouponStatus};
use crate::domain::inventory::{InventoryRepository, Product};
use crate::domain::reconciliation::{ReconciliationEntry, ReconciliationKind, ReconciliationLog};
use crate::event_sourcing::scylla_store::lwt_applied;
use crate::event_sourcing::StoreError;

// ============================================================================
// ScyllaDB Repositories
// ============================================================================
//
// Stock and coupon usage live in counter tables and only ever move through
// `SET c = c + ?`, so concurrent requests never overwrite each other.
// Coupon definitions are JSON documents keyed by code; creation is guarded
// with `IF NOT EXISTS`.
//
// ============================================================================

pub struct ScyllaInventory {
    session: Arc<Session>,
}

impl ScyllaInventory {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn stock(&self, product_id: Uuid) -> Result<Option<i64>, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT stock FROM product_stock WHERE product_id = ?", (product_id,))
            .await
            .map_err(StoreError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        rows.maybe_first_row::<(Option<Counter>,)>()
            .map(|row| row.map(|(counter,)| counter.map_or(0, |c| c.0)))
            .map_err(StoreError::backend)
    }
}

#[async_trait]
impl InventoryRepository for ScyllaInventory {
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT name, price FROM products WHERE product_id = ?", (product_id,))
            .await
            .map_err(StoreError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        let Some((name, price)) = rows
            .maybe_first_row::<(String, String)>()
            .map_err(StoreError::backend)?
        else {
            return Ok(None);
        };

        let price = Decimal::from_str(&price).map_err(StoreError::backend)?;
        let stock = self.stock(product_id).await?.unwrap_or(0);

        Ok(Some(Product {
            id: product_id,
            name,
            price,
            stock,
        }))
    }

    async fn add_product(&self, product: &Product) -> Result<(), StoreError> {
        self.session
            .query_unpaged(
                "INSERT INTO products (product_id, name, price) VALUES (?, ?, ?)",
                (product.id, &product.name, product.price.to_string()),
            )
            .await
            .map_err(StoreError::backend)?;

        if product.stock != 0 {
            self.adjust_stock(product.id, product.stock).await?;
        }

        tracing::info!(product_id = %product.id, name = %product.name, stock = product.stock, "📦 Product added");
        Ok(())
    }

    async fn adjust_stock(&self, product_id: Uuid, delta: i64) -> Result<i64, StoreError> {
        self.session
            .query_unpaged(
                "UPDATE product_stock SET stock = stock + ? WHERE product_id = ?",
                (Counter(delta), product_id),
            )
            .await
            .map_err(StoreError::backend)?;

        self.stock(product_id)
            .await?
            .ok_or_else(|| StoreError::backend(format!("no stock counter for product {product_id}")))
    }
}

pub struct ScyllaCoupons {
    session: Arc<Session>,
}

impl ScyllaCoupons {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn usage(&self, code: &CouponCode, user_id: Uuid) -> Result<i64, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT used FROM coupon_usage WHERE code = ? AND user_id = ?",
                (code.as_str(), user_id),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(0),
        };

        Ok(rows
            .maybe_first_row::<(Option<Counter>,)>()
            .map_err(StoreError::backend)?
            .and_then(|(counter,)| counter)
            .map_or(0, |c| c.0))
    }
}

#[async_trait]
impl CouponRepository for ScyllaCoupons {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT definition FROM coupons WHERE code = ?", (code.as_str(),))
            .await
            .map_err(StoreError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows.maybe_first_row::<(String,)>().map_err(StoreError::backend)? {
            Some((definition,)) => Ok(Some(serde_json::from_str(&definition)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, coupon: &Coupon) -> Result<bool, StoreError> {
        let definition = serde_json::to_string(coupon)?;
        let result = self
            .session
            .query_unpaged(
                "INSERT INTO coupons (code, definition) VALUES (?, ?) IF NOT EXISTS",
                (coupon.code.as_str(), definition),
            )
            .await
            .map_err(StoreError::backend)?;

        lwt_applied(result)
    }

    async fn set_status(&self, code: &CouponCode, status: CouponStatus) -> Result<bool, StoreError> {
        let Some(mut coupon) = self.find_by_code(code).await? else {
            return Ok(false);
        };
        coupon.status = status;

        let result = self
            .session
            .query_unpaged(
                "UPDATE coupons SET definition = ? WHERE code = ? IF EXISTS",
                (serde_json::to_string(&coupon)?, code.as_str()),
            )
            .await
            .map_err(StoreError::backend)?;

        lwt_applied(result)
    }

    async fn used_count(&self, code: &CouponCode, user_id: Uuid) -> Result<u32, StoreError> {
        let used = self.usage(code, user_id).await?;
        Ok(u32::try_from(used.max(0)).unwrap_or(u32::MAX))
    }

    async fn adjust_usage(&self, code: &CouponCode, user_id: Uuid, delta: i64) -> Result<i64, StoreError> {
        self.session
            .query_unpaged(
                "UPDATE coupon_usage SET used = used + ? WHERE code = ? AND user_id = ?",
                (Counter(delta), code.as_str(), user_id),
            )
            .await
            .map_err(StoreError::backend)?;

        self.usage(code, user_id).await
    }
}

type ReconciliationRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
);

pub struct ScyllaReconciliationLog {
    session: Arc<Session>,
}

impl ScyllaReconciliationLog {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ReconciliationLog for ScyllaReconciliationLog {
    async fn record(&self, entry: &ReconciliationEntry) -> Result<(), StoreError> {
        tracing::error!(
            entry_id = %entry.id,
            kind = %entry.kind,
            order_id = %entry.order_id,
            request_id = %entry.request_id,
            detail = %entry.detail,
            "💀 Adding entry to reconciliation queue"
        );

        self.session
            .query_unpaged(
                "INSERT INTO reconciliation_queue (
                    id, order_id, user_id, request_id, kind, amount, detail, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    entry.id,
                    entry.order_id,
                    entry.user_id,
                    entry.request_id,
                    entry.kind.as_str(),
                    entry.amount.map(|a| a.to_string()),
                    &entry.detail,
                    entry.created_at,
                ),
            )
            .await
            .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>, StoreError> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let result = self
            .session
            .query_unpaged(
                "SELECT id, order_id, user_id, request_id, kind, amount, detail, created_at
                 FROM reconciliation_queue
                 LIMIT ?",
                (limit,),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut entries = Vec::new();
        for row in rows.rows::<ReconciliationRow>().map_err(StoreError::backend)? {
            let (id, order_id, user_id, request_id, kind, amount, detail, created_at) =
                row.map_err(StoreError::backend)?;

            let kind = ReconciliationKind::parse(&kind)
                .ok_or_else(|| StoreError::backend(format!("unknown reconciliation kind {kind}")))?;
            let amount = amount
                .map(|a| Decimal::from_str(&a))
                .transpose()
                .map_err(StoreError::backend)?;

            entries.push(ReconciliationEntry {
                id,
                order_id,
                user_id,
                request_id,
                kind,
                amount,
                detail,
                created_at,
            });
        }

        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}
