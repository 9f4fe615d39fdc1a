use rust_decimal::Decimal;
use uuid::Uuid;

use super::value_objects::{ItemStatus, OrderStatus, PaymentStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: u32 },

    #[error("Invalid unit price {price} for product {product_id}")]
    InvalidPrice { product_id: Uuid, price: Decimal },

    #[error("Product {0} appears more than once in the order")]
    DuplicateProduct(Uuid),

    #[error("Order has already been placed")]
    AlreadyPlaced,

    #[error("Aggregate not initialized")]
    NotInitialized,

    #[error("Item not found in order: {0}")]
    ItemNotFound(Uuid),

    #[error("No items selected")]
    NoItemsSelected,

    #[error("Item {product_id} cannot be cancelled in status {status}")]
    ItemNotCancellable { product_id: Uuid, status: ItemStatus },

    #[error("Order cannot be cancelled in status {0}")]
    OrderNotCancellable(OrderStatus),

    #[error("Order has delivered or returned items and cannot be cancelled")]
    OrderHasDeliveredItems,

    #[error("Nothing left to cancel on this order")]
    NothingToCancel,

    #[error("Item {product_id} cannot move from {from} to {to}")]
    InvalidItemTransition { product_id: Uuid, from: ItemStatus, to: ItemStatus },

    #[error("Order cannot move from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("Status {0} cannot be set through fulfilment updates")]
    UnsupportedFulfilmentStatus(ItemStatus),

    #[error("Order is awaiting payment")]
    AwaitingPayment,

    #[error("Payment cannot be updated in status {0}")]
    PaymentNotPending(PaymentStatus),

    #[error("Item {product_id} cannot be returned in status {status}")]
    ItemNotReturnable { product_id: Uuid, status: ItemStatus },

    #[error("Order cannot accept returns in status {0}")]
    OrderNotReturnable(OrderStatus),

    #[error("Return window of {days} days has expired for item {product_id}")]
    ReturnWindowExpired { product_id: Uuid, days: i64 },

    #[error("Reason must be at least {0} characters")]
    ReasonTooShort(usize),

    #[error("No pending return request for item {0}")]
    NoPendingReturn(Uuid),
}
