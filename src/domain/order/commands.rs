use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponSnapshot};
use super::value_objects::{ItemStatus, LineItem, PaymentMethod};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Coupon definitions are re-fetched by the caller and carried on the
// settlement commands (`None` when the coupon no longer exists), so the
// aggregate decides without touching storage.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Place {
        user_id: Uuid,
        items: Vec<LineItem>,
        coupon: Option<CouponSnapshot>,
        payment_method: PaymentMethod,
        gateway_order_id: Option<String>,
        at: DateTime<Utc>,
    },
    ConfirmPayment {
        payment_id: String,
        at: DateTime<Utc>,
    },
    FailPayment {
        reason: String,
        at: DateTime<Utc>,
    },
    UpdateItemStatus {
        product_id: Uuid,
        status: ItemStatus,
        at: DateTime<Utc>,
    },
    CancelItems {
        request_id: Uuid,
        product_ids: Vec<Uuid>,
        reason: String,
        coupon: Option<Coupon>,
        at: DateTime<Utc>,
    },
    CancelOrder {
        request_id: Uuid,
        reason: String,
        coupon: Option<Coupon>,
        at: DateTime<Utc>,
    },
    RequestReturn {
        product_id: Uuid,
        reason: String,
        return_window: Duration,
        at: DateTime<Utc>,
    },
    AcceptReturn {
        request_id: Uuid,
        product_id: Uuid,
        reason: String,
        coupon: Option<Coupon>,
        at: DateTime<Utc>,
    },
    DeclineReturn {
        product_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl OrderCommand {
    /// Idempotency key of money-moving commands
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            OrderCommand::CancelItems { request_id, .. }
            | OrderCommand::CancelOrder { request_id, .. }
            | OrderCommand::AcceptReturn { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}
