use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::coupon::CouponSnapshot;
use crate::domain::order::{
    ItemRefund, ItemStatus, LineItem, OrderAggregate, OrderStatus, PaymentMethod, PaymentStatus, StatusNote,
};
use crate::domain::wallet::{TransactionKind, WalletAggregate, WalletTransaction};
use crate::services::CancellationOutcome;

// ============================================================================
// Response Bodies
// ============================================================================
//
// Money is rendered as JSON numbers; stored events keep exact strings.
//
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRefundView {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub item_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub refund_amount: Decimal,
}

impl From<&ItemRefund> for ItemRefundView {
    fn from(refund: &ItemRefund) -> Self {
        Self {
            product_id: refund.product_id,
            name: refund.name.clone(),
            quantity: refund.quantity,
            item_total: refund.item_total,
            refund_amount: refund.refund_amount,
        }
    }
}

/// Result of a cancellation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResponse {
    pub success: bool,
    pub message: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub refund_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_order_total: Decimal,
    pub order_fully_cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_status: Option<ItemStatus>,
    pub order_status: OrderStatus,
    pub coupon_removed: bool,
    pub coupon_recalculated: bool,
    pub wallet_credited: bool,
    pub request_id: Uuid,
    pub item_refunds: Vec<ItemRefundView>,
}

impl CancellationResponse {
    pub fn new(outcome: &CancellationOutcome, include_item_status: bool) -> Self {
        let message = if outcome.order_fully_cancelled {
            "Order cancelled successfully"
        } else {
            "Item cancelled successfully"
        };

        Self {
            success: true,
            message: message.to_string(),
            refund_amount: outcome.total_refund_amount,
            new_order_total: outcome.new_order_total,
            order_fully_cancelled: outcome.order_fully_cancelled,
            item_status: include_item_status.then_some(outcome.item_status),
            order_status: outcome.order_status,
            coupon_removed: outcome.coupon_removed,
            coupon_recalculated: outcome.coupon_recalculated,
            wallet_credited: outcome.wallet_credited,
            request_id: outcome.request_id,
            item_refunds: outcome.item_refunds.iter().map(ItemRefundView::from).collect(),
        }
    }
}

/// Result of an admin return decision
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnDecisionResponse {
    pub success: bool,
    pub message: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub refund_amount: Decimal,
    pub coupon_removed: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_order_total: Decimal,
}

impl ReturnDecisionResponse {
    pub fn accepted(outcome: &CancellationOutcome) -> Self {
        Self {
            success: true,
            message: "Return accepted and refund processed".to_string(),
            refund_amount: outcome.total_refund_amount,
            coupon_removed: outcome.coupon_removed,
            new_order_total: outcome.new_order_total,
        }
    }

    pub fn declined(order: &OrderAggregate) -> Self {
        Self {
            success: true,
            message: "Return declined".to_string(),
            refund_amount: Decimal::ZERO,
            coupon_removed: false,
            new_order_total: order.total_amount,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponView {
    pub code: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
}

impl From<&CouponSnapshot> for CouponView {
    fn from(snapshot: &CouponSnapshot) -> Self {
        Self {
            code: snapshot.code.clone(),
            discount_amount: snapshot.discount_amount,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemView {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub status: ItemStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancellation: Option<StatusNote>,
    pub return_request: Option<StatusNote>,
    pub return_resolution: Option<StatusNote>,
}

impl From<&LineItem> for LineItemView {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            quantity: item.quantity,
            price: item.unit_price,
            status: item.status,
            delivered_at: item.delivered_at,
            cancellation: item.cancellation.clone(),
            return_request: item.return_request.clone(),
            return_resolution: item.return_resolution.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<LineItemView>,
    pub coupon: Option<CouponView>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OrderAggregate> for OrderView {
    fn from(order: &OrderAggregate) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            items: order.items.iter().map(LineItemView::from).collect(),
            coupon: order.coupon.as_ref().map(CouponView::from),
            total_amount: order.total_amount,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            gateway_order_id: order.gateway_order_id.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    pub order: OrderView,
}

impl OrderResponse {
    pub fn new(order: &OrderAggregate) -> Self {
        Self {
            success: true,
            order: OrderView::from(order),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub date: DateTime<Utc>,
}

impl From<&WalletTransaction> for TransactionView {
    fn from(tx: &WalletTransaction) -> Self {
        Self {
            id: tx.id,
            amount: tx.amount,
            kind: tx.kind,
            description: tx.description.clone(),
            date: tx.date,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub success: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transactions: Vec<TransactionView>,
}

impl From<&WalletAggregate> for WalletResponse {
    fn from(wallet: &WalletAggregate) -> Self {
        Self {
            success: true,
            balance: wallet.balance,
            // Newest first
            transactions: wallet.transactions.iter().rev().map(TransactionView::from).collect(),
        }
    }
}
