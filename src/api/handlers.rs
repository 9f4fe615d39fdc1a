use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::health::check_all;
use crate::services::{Actor, CartLine, ServiceError, SettlementOptions};
use super::errors::ApiResult;
use super::identity::{AdminId, CustomerId, IdempotencyKey};
use super::requests::*;
use super::responses::*;
use super::state::AppState;

const DEFAULT_PENDING_LIMIT: usize = 100;

// ============================================================================
// Cancellation & Returns
// ============================================================================

pub async fn cancel_item(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    customer: CustomerId,
    key: IdempotencyKey,
    body: Option<web::Json<CancelRequest>>,
) -> ApiResult<HttpResponse> {
    let (order_id, product_id) = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    let outcome = state
        .cancellation
        .cancel_items(
            order_id,
            vec![product_id],
            customer.0,
            SettlementOptions { reason: body.reason, request_id: key.0 },
        )
        .await?;

    Ok(HttpResponse::Ok().json(CancellationResponse::new(&outcome, true)))
}

pub async fn cancel_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    customer: CustomerId,
    key: IdempotencyKey,
    body: Option<web::Json<CancelRequest>>,
) -> ApiResult<HttpResponse> {
    let order_id = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    let outcome = state
        .cancellation
        .cancel_order(
            order_id,
            customer.0,
            SettlementOptions { reason: body.reason, request_id: key.0 },
        )
        .await?;

    Ok(HttpResponse::Ok().json(CancellationResponse::new(&outcome, false)))
}

pub async fn return_item(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    customer: CustomerId,
    body: web::Json<ReturnItemRequest>,
) -> ApiResult<HttpResponse> {
    let (order_id, product_id) = path.into_inner();
    state
        .cancellation
        .request_return(order_id, product_id, customer.0, &body.reason)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::ok("Return request submitted")))
}

pub async fn accept_return(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    admin: AdminId,
    key: IdempotencyKey,
    body: web::Json<ReturnDecisionRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let outcome = state
        .cancellation
        .accept_return(
            path.into_inner(),
            body.product_id,
            admin.0,
            SettlementOptions { reason: body.reason, request_id: key.0 },
        )
        .await?;

    Ok(HttpResponse::Ok().json(ReturnDecisionResponse::accepted(&outcome)))
}

pub async fn decline_return(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    admin: AdminId,
    body: web::Json<ReturnDecisionRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let order = state
        .cancellation
        .decline_return(path.into_inner(), body.product_id, admin.0, body.reason)
        .await?;

    Ok(HttpResponse::Ok().json(ReturnDecisionResponse::declined(&order)))
}

// ============================================================================
// Checkout
// ============================================================================

pub async fn place_order(
    state: web::Data<AppState>,
    customer: CustomerId,
    body: web::Json<PlaceOrderRequest>,
) -> ApiResult<HttpResponse> {
    let placed = state.checkout.place_order(customer.0, body.into_inner().into()).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "order": OrderView::from(&placed.order),
        "gatewayOrderId": placed.gateway_order_id,
    })))
}

pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    customer: CustomerId,
) -> ApiResult<HttpResponse> {
    let order = state
        .checkout
        .order(path.into_inner(), Actor::Customer(customer.0))
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(&order)))
}

pub async fn verify_payment(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    customer: CustomerId,
    body: web::Json<VerifyPaymentRequest>,
) -> ApiResult<HttpResponse> {
    let order = state
        .checkout
        .confirm_payment(
            path.into_inner(),
            customer.0,
            &body.gateway_order_id,
            &body.payment_id,
            &body.signature,
        )
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(&order)))
}

pub async fn apply_coupon(
    state: web::Data<AppState>,
    customer: CustomerId,
    body: web::Json<ApplyCouponRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let lines: Vec<CartLine> = body.items.into_iter().map(CartLine::from).collect();
    let applied = state.checkout.apply_coupon(customer.0, &lines, &body.code).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "coupon": applied,
    })))
}

pub async fn get_wallet(state: web::Data<AppState>, customer: CustomerId) -> ApiResult<HttpResponse> {
    let wallet = state.wallet.wallet(customer.0).await.map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(WalletResponse::from(&wallet)))
}

// ============================================================================
// Admin
// ============================================================================

pub async fn create_coupon(
    state: web::Data<AppState>,
    _admin: AdminId,
    body: web::Json<CreateCouponRequest>,
) -> ApiResult<HttpResponse> {
    let coupon = state.admin.create_coupon(body.into_inner().into()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "code": coupon.code.as_str(),
        "status": coupon.status,
    })))
}

pub async fn set_coupon_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    _admin: AdminId,
    body: web::Json<CouponStatusRequest>,
) -> ApiResult<HttpResponse> {
    state.admin.set_coupon_status(&path.into_inner(), body.status).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::ok("Coupon status updated")))
}

pub async fn add_product(
    state: web::Data<AppState>,
    _admin: AdminId,
    body: web::Json<AddProductRequest>,
) -> ApiResult<HttpResponse> {
    let product = state.admin.add_product(&body.name, body.price, body.stock).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "product": product,
    })))
}

pub async fn update_item_status(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    admin: AdminId,
    body: web::Json<ItemStatusRequest>,
) -> ApiResult<HttpResponse> {
    let (order_id, product_id) = path.into_inner();
    let order = state
        .checkout
        .update_item_status(order_id, product_id, body.status, admin.0)
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(&order)))
}

pub async fn pending_reconciliation(
    state: web::Data<AppState>,
    _admin: AdminId,
    query: web::Query<PendingQuery>,
) -> ApiResult<HttpResponse> {
    let entries = state
        .admin
        .pending_reconciliation(query.limit.unwrap_or(DEFAULT_PENDING_LIMIT))
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "entries": entries,
    })))
}

// ============================================================================
// Operations
// ============================================================================

pub async fn metrics(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let buffer = state
        .metrics
        .encode()
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let report = check_all(&state.health_checks).await;
    if report.status.is_healthy() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}
