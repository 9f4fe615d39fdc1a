use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::coupon::CouponSnapshot;
use crate::event_sourcing::DomainEvent;
use super::value_objects::{ItemRefund, ItemStatus, LineItem, OrderStatus, PaymentMethod, PaymentStatus};

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    PaymentConfirmed(PaymentConfirmed),
    PaymentFailed(PaymentFailed),
    ItemStatusChanged(ItemStatusChanged),
    ItemsCancelled(Settlement),
    ReturnRequested(ReturnRequested),
    ReturnAccepted(Settlement),
    ReturnDeclined(ReturnDeclined),
}

impl DomainEvent for OrderEvent {
    fn event_name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::PaymentConfirmed(_) => "OrderPaymentConfirmed",
            OrderEvent::PaymentFailed(_) => "OrderPaymentFailed",
            OrderEvent::ItemStatusChanged(_) => "OrderItemStatusChanged",
            OrderEvent::ItemsCancelled(_) => "OrderItemsCancelled",
            OrderEvent::ReturnRequested(_) => "OrderReturnRequested",
            OrderEvent::ReturnAccepted(_) => "OrderReturnAccepted",
            OrderEvent::ReturnDeclined(_) => "OrderReturnDeclined",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - Initial event in order lifecycle
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPlaced {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub coupon: Option<CouponSnapshot>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentConfirmed {
    pub payment_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentFailed {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Fulfilment progress on one line, with the order-level state it implies
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ItemStatusChanged {
    pub product_id: Uuid,
    pub status: ItemStatus,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub changed_at: DateTime<Utc>,
}

/// Money-moving outcome of a cancellation or an accepted return.
///
/// Recorded in full so a replayed request can be answered without
/// recomputing anything.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settlement {
    pub request_id: Uuid,
    pub product_ids: Vec<Uuid>,
    pub reason: String,
    pub item_refunds: Vec<ItemRefund>,
    pub total_refund: Decimal,
    pub coupon: Option<CouponSnapshot>,
    pub coupon_removed: bool,
    pub coupon_recalculated: bool,
    pub new_total: Decimal,
    pub order_status: OrderStatus,
    /// Whether the refund is owed to the wallet (the order had been paid)
    pub refund_to_wallet: bool,
    pub settled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnRequested {
    pub product_id: Uuid,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnDeclined {
    pub product_id: Uuid,
    pub reason: String,
    pub order_status: OrderStatus,
    pub declined_at: DateTime<Utc>,
}
