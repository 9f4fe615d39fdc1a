// ============================================================================
// Inventory Domain
// ============================================================================
//
// Product catalog entries (name and current sale price, captured onto line
// items at checkout) and stock counters. Stock only moves through atomic
// `adjust_stock` increments.
//
// ============================================================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        name: String,
        requested: u32,
        available: i64,
    },

    #[error("Product name cannot be empty")]
    EmptyName,

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Initial stock cannot be negative")]
    NegativeStock,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Product {
    pub fn new(name: &str, price: Decimal, stock: i64) -> Result<Self, InventoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::EmptyName);
        }
        if price < Decimal::ZERO {
            return Err(InventoryError::InvalidPrice(price));
        }
        if stock < 0 {
            return Err(InventoryError::NegativeStock);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            stock,
        })
    }
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Create a catalog entry with its opening stock.
    async fn add_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Atomically add `delta` (may be negative) to the stock counter and
    /// return the resulting stock.
    async fn adjust_stock(&self, product_id: Uuid, delta: i64) -> Result<i64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_validation() {
        assert!(matches!(Product::new("  ", Decimal::ONE, 1), Err(InventoryError::EmptyName)));
        assert!(matches!(
            Product::new("Mug", Decimal::NEGATIVE_ONE, 1),
            Err(InventoryError::InvalidPrice(_))
        ));
        assert!(matches!(Product::new("Mug", Decimal::ONE, -1), Err(InventoryError::NegativeStock)));

        let product = Product::new(" Mug ", Decimal::new(29900, 2), 4).unwrap();
        assert_eq!(product.name, "Mug");
        assert_eq!(product.stock, 4);
    }
}
