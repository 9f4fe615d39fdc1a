// ============================================================================
// HTTP API
// ============================================================================
//
// actix-web routes over the application services. JSON bodies are camelCase;
// the caller is identified by the `X-User-Id` / `X-Admin-Id` headers set by
// the upstream auth gateway.
//
// ============================================================================

pub mod errors;
pub mod handlers;
pub mod identity;
pub mod requests;
pub mod responses;
pub mod state;

use actix_web::web;

pub use errors::ApiError;
pub use state::{AppState, Backends};

/// Register every route plus body/path error handlers that answer in the
/// API's error shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    // Customer
    .route("/cancelItem/{order_id}/{product_id}", web::post().to(handlers::cancel_item))
    .route("/order/cancel/{order_id}", web::post().to(handlers::cancel_order))
    .route("/returnItem/{order_id}/{product_id}", web::post().to(handlers::return_item))
    .route("/orders", web::post().to(handlers::place_order))
    .route("/orders/{order_id}", web::get().to(handlers::get_order))
    .route("/orders/{order_id}/payment/verify", web::post().to(handlers::verify_payment))
    .route("/coupon/apply", web::post().to(handlers::apply_coupon))
    .route("/wallet", web::get().to(handlers::get_wallet))
    // Admin
    .route("/admin/order/return/accept/{order_id}", web::post().to(handlers::accept_return))
    .route("/admin/order/return/decline/{order_id}", web::post().to(handlers::decline_return))
    .route(
        "/admin/order/{order_id}/item/{product_id}/status",
        web::post().to(handlers::update_item_status),
    )
    .route("/admin/coupons", web::post().to(handlers::create_coupon))
    .route("/admin/coupons/{code}/status", web::post().to(handlers::set_coupon_status))
    .route("/admin/products", web::post().to(handlers::add_product))
    .route("/admin/reconciliation", web::get().to(handlers::pending_reconciliation))
    // Operations
    .route("/metrics", web::get().to(handlers::metrics))
    .route("/health", web::get().to(handlers::health));
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::NewCoupon;
    use crate::domain::order::{ItemStatus, PaymentMethod};
    use crate::metrics::Metrics;
    use crate::services::payment::{sign_payment, LocalGateway};
    use crate::services::{CartLine, PlaceOrder};
    use crate::utils::RetryConfig;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use uuid::Uuid;

    const SECRET: &str = "http_test_secret";

    struct Seeded {
        state: web::Data<AppState>,
        user_id: Uuid,
        admin_id: Uuid,
        products: Vec<Uuid>,
    }

    async fn seeded() -> Seeded {
        let state = web::Data::new(AppState::new(
            Backends::in_memory(),
            Arc::new(LocalGateway::new(SECRET)),
            Arc::new(Metrics::new().unwrap()),
            RetryConfig::for_conflicts(5),
            chrono::Duration::days(7),
        ));

        let mut products = Vec::new();
        for (name, price) in [("Backpack", 500), ("Jacket", 600), ("Bottle", 400)] {
            let product = state.admin.add_product(name, Decimal::from(price), 20).await.unwrap();
            products.push(product.id);
        }
        state
            .admin
            .create_coupon(NewCoupon {
                code: "SAVE20".to_string(),
                discount: Decimal::from(20),
                minimum_amount: Decimal::from(1000),
                max_discount: None,
                usage_limit: 10,
                expires_at: None,
            })
            .await
            .unwrap();

        Seeded {
            state,
            user_id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            products,
        }
    }

    impl Seeded {
        async fn place(&self, method: PaymentMethod) -> (Uuid, Option<String>) {
            let placed = self
                .state
                .checkout
                .place_order(
                    self.user_id,
                    PlaceOrder {
                        lines: self.products.iter().map(|id| CartLine { product_id: *id, quantity: 1 }).collect(),
                        coupon_code: Some("SAVE20".to_string()),
                        payment_method: method,
                    },
                )
                .await
                .unwrap();
            (placed.order.id, placed.gateway_order_id)
        }
    }

    #[actix_web::test]
    async fn test_cancel_item_over_http() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;
        let (order_id, _) = s.place(PaymentMethod::Cod).await;

        let req = test::TestRequest::post()
            .uri(&format!("/cancelItem/{order_id}/{}", s.products[0]))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({ "reason": "Changed my mind" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        // 1500 subtotal, 300 discount; 500 - 500/1500 × 300
        assert_eq!(body["refundAmount"].as_f64(), Some(400.0));
        assert_eq!(body["newOrderTotal"].as_f64(), Some(800.0));
        assert_eq!(body["orderFullyCancelled"], false);
        assert_eq!(body["itemStatus"], "Cancelled");
        assert_eq!(body["orderStatus"], "Processing");
        assert_eq!(body["couponRemoved"], false);
        assert_eq!(body["walletCredited"], false);

        // Second attempt without the same key is a state error
        let req = test::TestRequest::post()
            .uri(&format!("/cancelItem/{order_id}/{}", s.products[0]))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_idempotency_key_replays_outcome() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;
        let (order_id, _) = s.place(PaymentMethod::Cod).await;
        let key = Uuid::new_v4().to_string();

        let mut refunds = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri(&format!("/order/cancel/{order_id}"))
                .insert_header(("X-User-Id", s.user_id.to_string()))
                .insert_header(("Idempotency-Key", key.clone()))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["orderFullyCancelled"], true);
            assert!(body.get("itemStatus").is_none());
            refunds.push(body["refundAmount"].clone());
        }
        assert_eq!(refunds[0], refunds[1]);

        let req = test::TestRequest::post()
            .uri(&format!("/order/cancel/{order_id}"))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .insert_header(("Idempotency-Key", "not-a-uuid"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_identity_is_required_and_scoped() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;
        let (order_id, _) = s.place(PaymentMethod::Cod).await;

        let req = test::TestRequest::post()
            .uri(&format!("/order/cancel/{order_id}"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri(&format!("/orders/{order_id}"))
            .insert_header(("X-User-Id", Uuid::new_v4().to_string()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/admin/products")
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({ "name": "Cap", "price": 150, "stock": 3 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_online_order_paid_then_cancelled_refunds_wallet() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({
                "items": [
                    { "productId": s.products[0], "quantity": 1 },
                    { "productId": s.products[1], "quantity": 1 },
                    { "productId": s.products[2], "quantity": 1 }
                ],
                "couponCode": "save20",
                "paymentMethod": "Online"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["order"]["status"], "Pending Payment");
        assert_eq!(body["order"]["totalAmount"].as_f64(), Some(1200.0));
        let order_id = body["order"]["id"].as_str().unwrap().to_string();
        let gateway_order_id = body["gatewayOrderId"].as_str().unwrap().to_string();

        let signature = sign_payment(SECRET, &gateway_order_id, "pay_77").unwrap();
        let req = test::TestRequest::post()
            .uri(&format!("/orders/{order_id}/payment/verify"))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({
                "gatewayOrderId": gateway_order_id,
                "paymentId": "pay_77",
                "signature": signature
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["paymentStatus"], "Paid");

        // Remaining 900 falls below the 1000 minimum: coupon dropped, full-price refund
        let req = test::TestRequest::post()
            .uri(&format!("/cancelItem/{order_id}/{}", s.products[1]))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["refundAmount"].as_f64(), Some(600.0));
        assert_eq!(body["walletCredited"], true);
        assert_eq!(body["couponRemoved"], true);
        assert_eq!(body["newOrderTotal"].as_f64(), Some(900.0));

        let req = test::TestRequest::get()
            .uri("/wallet")
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["balance"].as_f64(), Some(600.0));
        assert_eq!(body["transactions"][0]["type"], "credit");
    }

    #[actix_web::test]
    async fn test_return_flow_over_http() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;
        let (order_id, _) = s.place(PaymentMethod::Cod).await;

        for product_id in &s.products {
            for status in [ItemStatus::Shipped, ItemStatus::Delivered] {
                s.state
                    .checkout
                    .update_item_status(order_id, *product_id, status, s.admin_id)
                    .await
                    .unwrap();
            }
        }

        let req = test::TestRequest::post()
            .uri(&format!("/returnItem/{order_id}/{}", s.products[2]))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({ "reason": "short" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/returnItem/{order_id}/{}", s.products[2]))
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({ "reason": "Bottle leaks at the cap" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);

        let req = test::TestRequest::post()
            .uri(&format!("/admin/order/return/accept/{order_id}"))
            .insert_header(("X-Admin-Id", s.admin_id.to_string()))
            .set_json(json!({ "productId": s.products[2] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        // 400 - 400/1500 × 300 = 320; 1100 still qualifies so the coupon is recalculated
        assert_eq!(body["refundAmount"].as_f64(), Some(320.0));
        assert_eq!(body["couponRemoved"], false);
        assert_eq!(body["newOrderTotal"].as_f64(), Some(880.0));

        let req = test::TestRequest::get()
            .uri("/admin/reconciliation?limit=10")
            .insert_header(("X-Admin-Id", s.admin_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["entries"].as_array().map(Vec::len), Some(0));
    }

    #[actix_web::test]
    async fn test_admin_coupon_routes() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/admin/coupons")
            .insert_header(("X-Admin-Id", s.admin_id.to_string()))
            .set_json(json!({ "code": "SAVE20", "discount": 5, "usageLimit": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/admin/coupons/SAVE20/status")
            .insert_header(("X-Admin-Id", s.admin_id.to_string()))
            .set_json(json!({ "status": "Inactive" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/coupon/apply")
            .insert_header(("X-User-Id", s.user_id.to_string()))
            .set_json(json!({
                "items": [{ "productId": s.products[1], "quantity": 2 }],
                "code": "SAVE20"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/admin/coupons")
            .insert_header(("X-Admin-Id", s.admin_id.to_string()))
            .set_json(json!({
                "code": "FLAT",
                "discount": 10,
                "usageLimit": 1,
                "expiresAt": Utc::now() + chrono::Duration::days(1)
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_health_and_metrics() {
        let s = seeded().await;
        let app = test::init_service(App::new().app_data(s.state.clone()).configure(configure)).await;
        s.place(PaymentMethod::Cod).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"]["state"], "healthy");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("orders_placed_total"));
    }
}
