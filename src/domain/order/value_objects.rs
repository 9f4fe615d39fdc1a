use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::utils::money::line_total;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One product entry within an order. Name and unit price are captured at
/// checkout and never re-read from the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub status: ItemStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancellation: Option<StatusNote>,
    pub return_request: Option<StatusNote>,
    pub return_resolution: Option<StatusNote>,
}

impl LineItem {
    pub fn new(product_id: Uuid, name: &str, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            name: name.to_string(),
            quantity,
            unit_price,
            status: ItemStatus::Placed,
            delivered_at: None,
            cancellation: None,
            return_request: None,
            return_resolution: None,
        }
    }

    pub fn total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }
}

/// Reason and timestamp attached to a cancellation or return step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusNote {
    pub reason: String,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Item Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    #[serde(alias = "Ordered")]
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    #[serde(rename = "Return Requested")]
    ReturnRequested,
    Returned,
    #[serde(rename = "Return Declined")]
    ReturnDeclined,
}

impl ItemStatus {
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Placed, Processing)
                | (Placed, Shipped)
                | (Placed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
                | (Delivered, ReturnRequested)
                | (ReturnRequested, Returned)
                | (ReturnRequested, ReturnDeclined)
        )
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(ItemStatus::Cancelled)
    }

    /// Whether the item still counts toward the order subtotal
    pub fn is_billable(self) -> bool {
        !matches!(self, ItemStatus::Cancelled | ItemStatus::Returned)
    }

    /// Still on its way to the customer
    pub fn is_awaiting_delivery(self) -> bool {
        matches!(self, ItemStatus::Placed | ItemStatus::Processing | ItemStatus::Shipped)
    }

    /// Delivered, or any state reachable only after delivery
    pub fn is_post_delivery(self) -> bool {
        matches!(
            self,
            ItemStatus::Delivered
                | ItemStatus::ReturnRequested
                | ItemStatus::Returned
                | ItemStatus::ReturnDeclined
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemStatus::Placed => "Placed",
            ItemStatus::Processing => "Processing",
            ItemStatus::Shipped => "Shipped",
            ItemStatus::Delivered => "Delivered",
            ItemStatus::Cancelled => "Cancelled",
            ItemStatus::ReturnRequested => "Return Requested",
            ItemStatus::Returned => "Returned",
            ItemStatus::ReturnDeclined => "Return Declined",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Order Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Pending Payment", alias = "Pending")]
    PendingPayment,
    #[serde(rename = "Payment Failed")]
    PaymentFailed,
    #[serde(alias = "Placed")]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    #[serde(rename = "Return Requested")]
    ReturnRequested,
    Returned,
    #[serde(rename = "Return Declined")]
    ReturnDeclined,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Processing)
                | (PendingPayment, PaymentFailed)
                | (PendingPayment, Cancelled)
                | (PaymentFailed, Processing)
                | (PaymentFailed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
                | (Processing, ReturnRequested)
                | (Shipped, ReturnRequested)
                | (Delivered, ReturnRequested)
                | (Returned, ReturnRequested)
                | (ReturnDeclined, ReturnRequested)
                | (ReturnRequested, Processing)
                | (ReturnRequested, Shipped)
                | (ReturnRequested, Returned)
                | (ReturnRequested, ReturnDeclined)
        )
    }

    /// States from which the whole order may be cancelled
    pub fn allows_order_cancel(self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::PaymentFailed | OrderStatus::Processing
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::PendingPayment => "Pending Payment",
            OrderStatus::PaymentFailed => "Payment Failed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::ReturnRequested => "Return Requested",
            OrderStatus::Returned => "Returned",
            OrderStatus::ReturnDeclined => "Return Declined",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Payment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD", alias = "cod")]
    Cod,
    #[serde(alias = "online")]
    Online,
    #[serde(alias = "wallet")]
    Wallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Online => "Online",
            PaymentMethod::Wallet => "Wallet",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
        })
    }
}

/// Refund computed for one cancelled or returned line
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemRefund {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub item_total: Decimal,
    pub refund_amount: Decimal,
}

// ============================================================================
// Unit Tests
// ============================================================================
