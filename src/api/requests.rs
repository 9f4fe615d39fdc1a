use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::coupon::{CouponStatus, NewCoupon};
use crate::domain::order::{ItemStatus, PaymentMethod};
use crate::services::{CartLine, PlaceOrder};

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnDecisionRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

impl From<CartLineRequest> for CartLine {
    fn from(line: CartLineRequest) -> Self {
        CartLine {
            product_id: line.product_id,
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<CartLineRequest>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
}

impl From<PlaceOrderRequest> for PlaceOrder {
    fn from(request: PlaceOrderRequest) -> Self {
        PlaceOrder {
            lines: request.items.into_iter().map(CartLine::from).collect(),
            coupon_code: request.coupon_code,
            payment_method: request.payment_method,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub items: Vec<CartLineRequest>,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub minimum_amount: Decimal,
    #[serde(default, alias = "maxAmount", with = "rust_decimal::serde::float_option")]
    pub max_discount: Option<Decimal>,
    pub usage_limit: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CreateCouponRequest> for NewCoupon {
    fn from(request: CreateCouponRequest) -> Self {
        NewCoupon {
            code: request.code,
            discount: request.discount,
            minimum_amount: request.minimum_amount,
            max_discount: request.max_discount,
            usage_limit: request.usage_limit,
            expires_at: request.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponStatusRequest {
    pub status: CouponStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProductRequest {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatusRequest {
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<usize>,
}
