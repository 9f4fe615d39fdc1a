use uuid::Uuid;

use crate::domain::coupon::CouponError;
use crate::domain::inventory::InventoryError;
use crate::domain::order::{OrderCommandError, OrderError};
use crate::domain::wallet::{LedgerError, WalletError};
use crate::event_sourcing::StoreError;
use crate::utils::IsTransient;
use super::payment::PaymentError;

// ============================================================================
// Service Errors
// ============================================================================
//
// Everything a service operation can fail with, classified by `kind()` so
// the HTTP layer can pick a status code without matching on every variant.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input, rejected before any mutation
    Validation,
    /// Valid input that the current order/item state does not allow
    State,
    NotFound,
    /// Lost a race on the same aggregate after all retries
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::OrderNotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::Validation,

            ServiceError::Order(e) => match e {
                OrderError::ItemNotFound(_) => ErrorKind::NotFound,
                OrderError::EmptyItems
                | OrderError::InvalidQuantity { .. }
                | OrderError::InvalidPrice { .. }
                | OrderError::DuplicateProduct(_)
                | OrderError::NoItemsSelected
                | OrderError::ReasonTooShort(_)
                | OrderError::UnsupportedFulfilmentStatus(_) => ErrorKind::Validation,
                _ => ErrorKind::State,
            },

            ServiceError::Coupon(e) => match e {
                CouponError::NotFound(_) => ErrorKind::NotFound,
                CouponError::AlreadyExists(_) => ErrorKind::Conflict,
                CouponError::EmptyCode
                | CouponError::InvalidCode(_)
                | CouponError::InvalidDiscount(_)
                | CouponError::InvalidAmount { .. }
                | CouponError::InvalidUsageLimit => ErrorKind::Validation,
                _ => ErrorKind::State,
            },

            ServiceError::Wallet(e) => match e {
                WalletError::InsufficientFunds { .. } => ErrorKind::State,
                _ => ErrorKind::Validation,
            },

            ServiceError::Inventory(e) => match e {
                InventoryError::ProductNotFound(_) => ErrorKind::NotFound,
                InventoryError::InsufficientStock { .. } => ErrorKind::State,
                InventoryError::Store(_) => ErrorKind::Internal,
                _ => ErrorKind::Validation,
            },

            ServiceError::Payment(e) => match e {
                PaymentError::InvalidSignature => ErrorKind::Validation,
                PaymentError::Unavailable(_) => ErrorKind::Internal,
            },

            ServiceError::Store(StoreError::ConcurrencyConflict { .. }) => ErrorKind::Conflict,
            ServiceError::Store(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a client; internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Something went wrong, please try again later".to_string(),
            ErrorKind::Conflict if matches!(self, ServiceError::Store(_)) => {
                "The order was modified concurrently, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IsTransient for ServiceError {
    fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_transient())
    }
}

impl From<OrderCommandError> for ServiceError {
    fn from(err: OrderCommandError) -> Self {
        match err {
            OrderCommandError::NotFound(id) => ServiceError::OrderNotFound(id),
            OrderCommandError::Domain(e) => ServiceError::Order(e),
            OrderCommandError::Store(e) => ServiceError::Store(e),
            OrderCommandError::Corrupt(detail) => ServiceError::Internal(detail),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Wallet(e) => ServiceError::Wallet(e),
            LedgerError::Store(e) => ServiceError::Store(e),
            LedgerError::Corrupt(detail) => ServiceError::Internal(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ItemStatus, OrderStatus};

    #[test]
    fn test_error_kinds() {
        let product_id = Uuid::new_v4();
        assert_eq!(ServiceError::OrderNotFound(product_id).kind(), ErrorKind::NotFound);
        assert_eq!(ServiceError::from(OrderError::ItemNotFound(product_id)).kind(), ErrorKind::NotFound);
        assert_eq!(ServiceError::from(OrderError::ReasonTooShort(10)).kind(), ErrorKind::Validation);
        assert_eq!(
            ServiceError::from(OrderError::ItemNotCancellable { product_id, status: ItemStatus::Cancelled }).kind(),
            ErrorKind::State
        );
        assert_eq!(
            ServiceError::from(OrderError::OrderNotCancellable(OrderStatus::Delivered)).kind(),
            ErrorKind::State
        );
        let conflict = StoreError::ConcurrencyConflict { aggregate_id: product_id, expected: 1, actual: 2 };
        assert_eq!(ServiceError::from(conflict).kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ServiceError::Store(StoreError::Backend("connection refused to 10.0.0.3".to_string()));
        assert!(!err.public_message().contains("10.0.0.3"));

        let err = ServiceError::from(OrderError::ReasonTooShort(10));
        assert_eq!(err.public_message(), "Reason must be at least 10 characters");
    }

    #[test]
    fn test_only_store_conflicts_are_transient() {
        let conflict = StoreError::ConcurrencyConflict { aggregate_id: Uuid::new_v4(), expected: 1, actual: 2 };
        assert!(ServiceError::from(conflict).is_transient());
        assert!(!ServiceError::from(OrderError::NoItemsSelected).is_transient());
    }
}
