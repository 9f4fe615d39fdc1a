use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::coupon::{AppliedCoupon, Coupon, CouponCode, CouponError, CouponRepository, CouponSnapshot};
use crate::domain::inventory::{InventoryError, InventoryRepository};
use crate::domain::order::{
    ItemStatus, LineItem, OrderAggregate, OrderCommand, OrderCommandHandler, OrderError, PaymentMethod,
};
use crate::domain::reconciliation::{ReconciliationEntry, ReconciliationKind, ReconciliationLog};
use crate::domain::wallet::WalletLedger;
use crate::metrics::Metrics;
use crate::utils::RetryConfig;
use super::access::{load_for, run_command, Actor};
use super::errors::ServiceError;
use super::payment::PaymentGateway;

// ============================================================================
// Checkout Service
// ============================================================================
//
// Places orders and drives them through payment and fulfilment.
//
// Placing an order touches four stores (stock counters, coupon usage, the
// wallet and the order stream). Each step that succeeds pushes a
// reservation; if a later step fails they are released in reverse.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub lines: Vec<CartLine>,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderAggregate,
    /// Set for online payments; the client pays against it
    pub gateway_order_id: Option<String>,
}

#[derive(Debug, Clone)]
enum Reservation {
    Stock { product_id: Uuid, quantity: u32 },
    CouponUse { code: CouponCode },
    WalletDebit { amount: Decimal, reference: String },
}

pub struct CheckoutService {
    orders: Arc<OrderCommandHandler>,
    coupons: Arc<dyn CouponRepository>,
    inventory: Arc<dyn InventoryRepository>,
    wallet: Arc<WalletLedger>,
    reconciliation: Arc<dyn ReconciliationLog>,
    gateway: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

/// Collapse repeated products into one line, keeping first-seen order.
pub fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    OrderError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    },
                )?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<OrderCommandHandler>,
        coupons: Arc<dyn CouponRepository>,
        inventory: Arc<dyn InventoryRepository>,
        wallet: Arc<WalletLedger>,
        reconciliation: Arc<dyn ReconciliationLog>,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            orders,
            coupons,
            inventory,
            wallet,
            reconciliation,
            gateway,
            metrics,
            retry,
        }
    }

    // ========================================================================
    // Cart
    // ========================================================================

    /// Snapshot name and price from the catalog for each merged line.
    async fn price_lines(&self, lines: &[CartLine]) -> Result<Vec<LineItem>, ServiceError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in merge_lines(lines)? {
            let product = self
                .inventory
                .product(line.product_id)
                .await
                .map_err(InventoryError::from)?
                .ok_or(InventoryError::ProductNotFound(line.product_id))?;
            items.push(LineItem::new(product.id, &product.name, line.quantity, product.price));
        }
        Ok(items)
    }

    async fn price_coupon(
        &self,
        user_id: Uuid,
        raw_code: &str,
        subtotal: Decimal,
    ) -> Result<(Coupon, AppliedCoupon), ServiceError> {
        let code = CouponCode::parse(raw_code)?;
        let coupon = self
            .coupons
            .find_by_code(&code)
            .await?
            .ok_or_else(|| CouponError::NotFound(code.to_string()))?;
        let used = self.coupons.used_count(&code, user_id).await?;
        let applied = coupon.apply(subtotal, used, Utc::now())?;
        Ok((coupon, applied))
    }

    /// Price a coupon against a cart without reserving anything.
    pub async fn apply_coupon(
        &self,
        user_id: Uuid,
        lines: &[CartLine],
        code: &str,
    ) -> Result<AppliedCoupon, ServiceError> {
        let items = self.price_lines(lines).await?;
        let subtotal: Decimal = items.iter().map(LineItem::total).sum();
        let (_, applied) = self.price_coupon(user_id, code, subtotal).await?;

        tracing::debug!(
            user_id = %user_id,
            code = %applied.code,
            subtotal = %subtotal,
            discount_amount = %applied.discount_amount,
            "Coupon priced"
        );
        Ok(applied)
    }

    // ========================================================================
    // Place Order
    // ========================================================================

    pub async fn place_order(&self, user_id: Uuid, request: PlaceOrder) -> Result<PlacedOrder, ServiceError> {
        let order_id = Uuid::new_v4();
        let items = self.price_lines(&request.lines).await?;
        let subtotal: Decimal = items.iter().map(LineItem::total).sum();

        let priced_coupon = match request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.price_coupon(user_id, code, subtotal).await?),
            None => None,
        };

        let mut reservations = Vec::new();
        let result = self
            .reserve_and_place(order_id, user_id, items, priced_coupon, request.payment_method, &mut reservations)
            .await;

        match result {
            Ok(placed) => {
                self.metrics.record_order_placed(&request.payment_method.to_string());
                tracing::info!(
                    order_id = %order_id,
                    user_id = %user_id,
                    total = %placed.order.total_amount,
                    payment_method = %request.payment_method,
                    "🛒 Order placed"
                );
                Ok(placed)
            }
            Err(err) => {
                tracing::warn!(
                    order_id = %order_id,
                    user_id = %user_id,
                    error = %err,
                    reservations = reservations.len(),
                    "Checkout failed, releasing reservations"
                );
                self.release(order_id, user_id, reservations).await;
                Err(err)
            }
        }
    }

    async fn reserve_and_place(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        items: Vec<LineItem>,
        priced_coupon: Option<(Coupon, AppliedCoupon)>,
        payment_method: PaymentMethod,
        reservations: &mut Vec<Reservation>,
    ) -> Result<PlacedOrder, ServiceError> {
        // 1. Stock
        for item in &items {
            let remaining = self
                .inventory
                .adjust_stock(item.product_id, -i64::from(item.quantity))
                .await
                .map_err(InventoryError::from)?;
            reservations.push(Reservation::Stock {
                product_id: item.product_id,
                quantity: item.quantity,
            });

            if remaining < 0 {
                return Err(InventoryError::InsufficientStock {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    requested: item.quantity,
                    available: remaining + i64::from(item.quantity),
                }
                .into());
            }
        }

        // 2. Coupon usage
        let snapshot = match priced_coupon {
            Some((coupon, applied)) => {
                let used = self.coupons.adjust_usage(&coupon.code, user_id, 1).await?;
                reservations.push(Reservation::CouponUse { code: coupon.code.clone() });

                // Concurrent checkouts can all pass the pre-check; the counter decides
                if used > i64::from(coupon.usage_limit) {
                    return Err(CouponError::UsageLimitReached(coupon.code.to_string()).into());
                }
                Some(CouponSnapshot::applied(&coupon.code, applied.discount_amount))
            }
            None => None,
        };

        let subtotal: Decimal = items.iter().map(LineItem::total).sum();
        let discount = snapshot.as_ref().map_or(Decimal::ZERO, |s| s.discount_amount);
        let total = (subtotal - discount).max(Decimal::ZERO);

        // 3. Payment
        let mut gateway_order_id = None;
        match payment_method {
            PaymentMethod::Wallet if total > Decimal::ZERO => {
                let reference = format!("order:{order_id}");
                self.wallet
                    .debit(user_id, total, &format!("Payment for order {order_id}"), Some(reference.clone()))
                    .await?;
                reservations.push(Reservation::WalletDebit { amount: total, reference });
            }
            PaymentMethod::Online => {
                gateway_order_id = Some(self.gateway.create_order(total, order_id).await?);
            }
            _ => {}
        }

        // 4. Order
        let command = OrderCommand::Place {
            user_id,
            items,
            coupon: snapshot,
            payment_method,
            gateway_order_id: gateway_order_id.clone(),
            at: Utc::now(),
        };
        let order = self
            .orders
            .handle(order_id, command, order_id, Some(user_id))
            .await?;

        Ok(PlacedOrder { order, gateway_order_id })
    }

    async fn release(&self, order_id: Uuid, user_id: Uuid, reservations: Vec<Reservation>) {
        for reservation in reservations.into_iter().rev() {
            let (step, amount, result) = match &reservation {
                Reservation::Stock { product_id, quantity } => (
                    "stock_reservation",
                    None,
                    self.inventory
                        .adjust_stock(*product_id, i64::from(*quantity))
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                ),
                Reservation::CouponUse { code } => (
                    "coupon_usage",
                    None,
                    self.coupons
                        .adjust_usage(code, user_id, -1)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                ),
                Reservation::WalletDebit { amount, reference } => (
                    "wallet_debit",
                    Some(*amount),
                    self.wallet
                        .credit(
                            user_id,
                            *amount,
                            &format!("Payment reversal for order {order_id}"),
                            Some(format!("{reference}:reversal")),
                        )
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                ),
            };

            self.metrics.record_compensation(step, result.is_ok());
            if let Err(detail) = result {
                tracing::error!(order_id = %order_id, step = step, error = %detail, "Checkout release failed");
                let entry = ReconciliationEntry::new(
                    ReconciliationKind::CompensationFailed,
                    order_id,
                    user_id,
                    order_id,
                    amount,
                    format!("{step}: {detail}"),
                );
                self.metrics.record_reconciliation_entry(entry.kind.as_str());
                if let Err(err) = self.reconciliation.record(&entry).await {
                    tracing::error!(entry_id = %entry.id, error = %err, "Failed to persist reconciliation entry");
                }
            }
        }
    }

    // ========================================================================
    // Payment & Fulfilment
    // ========================================================================

    pub async fn order(&self, order_id: Uuid, actor: Actor) -> Result<OrderAggregate, ServiceError> {
        load_for(&self.orders, order_id, actor).await
    }

    /// Verify the gateway signature for an online order. A bad signature
    /// marks the payment failed so the customer can retry.
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<OrderAggregate, ServiceError> {
        let actor = Actor::Customer(user_id);
        let order = load_for(&self.orders, order_id, actor).await?;

        if order.gateway_order_id.as_deref() != Some(gateway_order_id) {
            return Err(ServiceError::Validation(format!(
                "Gateway order {gateway_order_id} does not belong to order {order_id}"
            )));
        }

        if let Err(err) = self.gateway.verify_signature(gateway_order_id, payment_id, signature) {
            self.metrics.record_payment_verification(false);
            tracing::warn!(order_id = %order_id, payment_id = %payment_id, "Payment signature rejected");

            let command = OrderCommand::FailPayment {
                reason: err.to_string(),
                at: Utc::now(),
            };
            run_command(&self.orders, &self.retry, &self.metrics, "payment_failed", order_id, actor, command).await?;
            return Err(err.into());
        }

        let command = OrderCommand::ConfirmPayment {
            payment_id: payment_id.to_string(),
            at: Utc::now(),
        };
        let order = run_command(&self.orders, &self.retry, &self.metrics, "payment_confirm", order_id, actor, command)
            .await?;

        self.metrics.record_payment_verification(true);
        tracing::info!(order_id = %order_id, payment_id = %payment_id, "💳 Payment verified");
        Ok(order)
    }

    /// Admin fulfilment update for one line item.
    pub async fn update_item_status(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        status: ItemStatus,
        admin_id: Uuid,
    ) -> Result<OrderAggregate, ServiceError> {
        let command = OrderCommand::UpdateItemStatus {
            product_id,
            status,
            at: Utc::now(),
        };
        let order = run_command(
            &self.orders,
            &self.retry,
            &self.metrics,
            "item_status",
            order_id,
            Actor::Admin(admin_id),
            command,
        )
        .await?;

        tracing::info!(
            order_id = %order_id,
            product_id = %product_id,
            item_status = %status,
            order_status = %order.status,
            "📦 Item status updated"
        );
        Ok(order)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::{CouponStatus, NewCoupon};
    use crate::event_sourcing::StoreError;
    use async_trait::async_trait;
    use std::time::Duration;
    use crate::domain::inventory::Product;
    use crate::domain::order::{OrderStatus, PaymentStatus};
    use crate::domain::wallet::WalletError;
    use crate::event_sourcing::InMemoryEventStore;
    use crate::persistence::{InMemoryCoupons, InMemoryInventory, InMemoryReconciliationLog};
    use crate::services::payment::{sign_payment, LocalGateway, PaymentError};

    const SECRET: &str = "test_secret";

    struct Fixture {
        checkout: CheckoutService,
        orders: Arc<OrderCommandHandler>,
        coupons: Arc<InMemoryCoupons>,
        inventory: Arc<InMemoryInventory>,
        wallet: Arc<WalletLedger>,
        user_id: Uuid,
        kettle: Uuid,
        lamp: Uuid,
    }

    async fn fixture() -> Fixture {
        let orders = Arc::new(OrderCommandHandler::new(Arc::new(InMemoryEventStore::<crate::domain::order::OrderEvent>::new())));
        let coupons = Arc::new(InMemoryCoupons::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let wallet = Arc::new(WalletLedger::new(
            Arc::new(InMemoryEventStore::<crate::domain::wallet::WalletEvent>::new()),
            RetryConfig::for_conflicts(5),
        ));

        let kettle = Product::new("Kettle", Decimal::from(600), 5).unwrap();
        let lamp = Product::new("Lamp", Decimal::from(400), 1).unwrap();
        inventory.add_product(&kettle).await.unwrap();
        inventory.add_product(&lamp).await.unwrap();

        let coupon = Coupon::create(
            NewCoupon {
                code: "SAVE10".to_string(),
                discount: Decimal::from(10),
                minimum_amount: Decimal::from(500),
                max_discount: Some(Decimal::from(150)),
                usage_limit: 1,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap();
        coupons.insert(&coupon).await.unwrap();

        let checkout = CheckoutService::new(
            orders.clone(),
            coupons.clone(),
            inventory.clone(),
            wallet.clone(),
            Arc::new(InMemoryReconciliationLog::new()),
            Arc::new(LocalGateway::new(SECRET)),
            Arc::new(Metrics::new().unwrap()),
            RetryConfig::for_conflicts(5),
        );

        Fixture {
            checkout,
            orders,
            coupons,
            inventory,
            wallet,
            user_id: Uuid::new_v4(),
            kettle: kettle.id,
            lamp: lamp.id,
        }
    }

    impl Fixture {
        async fn stock(&self, product_id: Uuid) -> i64 {
            self.inventory.product(product_id).await.unwrap().unwrap().stock
        }

        async fn usage(&self) -> u32 {
            let code = CouponCode::parse("SAVE10").unwrap();
            self.coupons.used_count(&code, self.user_id).await.unwrap()
        }
    }

    fn line(product_id: Uuid, quantity: u32) -> CartLine {
        CartLine { product_id, quantity }
    }

    /// Holds every caller between reading the usage counter and reserving it
    struct SlowCoupons(Arc<InMemoryCoupons>);

    #[async_trait]
    impl CouponRepository for SlowCoupons {
        async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
            self.0.find_by_code(code).await
        }

        async fn insert(&self, coupon: &Coupon) -> Result<bool, StoreError> {
            self.0.insert(coupon).await
        }

        async fn set_status(&self, code: &CouponCode, status: CouponStatus) -> Result<bool, StoreError> {
            self.0.set_status(code, status).await
        }

        async fn used_count(&self, code: &CouponCode, user_id: Uuid) -> Result<u32, StoreError> {
            let used = self.0.used_count(code, user_id).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            used
        }

        async fn adjust_usage(&self, code: &CouponCode, user_id: Uuid, delta: i64) -> Result<i64, StoreError> {
            self.0.adjust_usage(code, user_id, delta).await
        }
    }

    #[test]
    fn test_merge_lines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(&[line(a, 1), line(b, 2), line(a, 3)]).unwrap();
        assert_eq!(merged, vec![line(a, 4), line(b, 2)]);

        assert_eq!(merge_lines(&[]), Err(OrderError::EmptyItems));
        assert!(matches!(merge_lines(&[line(a, 0)]), Err(OrderError::InvalidQuantity { .. })));
        assert!(matches!(
            merge_lines(&[line(a, u32::MAX), line(a, 1)]),
            Err(OrderError::InvalidQuantity { quantity: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_place_cod_order_with_coupon() {
        let f = fixture().await;
        let placed = f
            .checkout
            .place_order(
                f.user_id,
                PlaceOrder {
                    lines: vec![line(f.kettle, 2), line(f.lamp, 1)],
                    coupon_code: Some("save10".to_string()),
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // 10% of 1600 capped at 150
        let order = placed.order;
        assert_eq!(order.coupon.as_ref().unwrap().discount_amount, Decimal::from(150));
        assert_eq!(order.total_amount, Decimal::from(1450));
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(placed.gateway_order_id.is_none());

        assert_eq!(f.stock(f.kettle).await, 3);
        assert_eq!(f.stock(f.lamp).await, 0);
        assert_eq!(f.usage().await, 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock_releases_reservations() {
        let f = fixture().await;
        let err = f
            .checkout
            .place_order(
                f.user_id,
                PlaceOrder {
                    lines: vec![line(f.kettle, 1), line(f.lamp, 2)],
                    coupon_code: Some("SAVE10".to_string()),
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Inventory(InventoryError::InsufficientStock { available: 1, .. })));
        assert_eq!(f.stock(f.kettle).await, 5);
        assert_eq!(f.stock(f.lamp).await, 1);
        assert_eq!(f.usage().await, 0);
    }

    #[tokio::test]
    async fn test_wallet_payment_requires_balance() {
        let f = fixture().await;
        let request = PlaceOrder {
            lines: vec![line(f.kettle, 1)],
            coupon_code: Some("SAVE10".to_string()),
            payment_method: PaymentMethod::Wallet,
        };

        let err = f.checkout.place_order(f.user_id, request.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Wallet(WalletError::InsufficientFunds { .. })));
        assert_eq!(f.stock(f.kettle).await, 5);
        assert_eq!(f.usage().await, 0);

        f.wallet.credit(f.user_id, Decimal::from(1000), "Top up", None).await.unwrap();
        let placed = f.checkout.place_order(f.user_id, request).await.unwrap();
        assert_eq!(placed.order.payment_status, PaymentStatus::Paid);
        assert_eq!(f.wallet.wallet(f.user_id).await.unwrap().balance, Decimal::from(460));
    }

    #[tokio::test]
    async fn test_coupon_rules_apply_before_reserving() {
        let f = fixture().await;
        let err = f
            .checkout
            .apply_coupon(f.user_id, &[line(f.lamp, 1)], "SAVE10")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Coupon(CouponError::BelowMinimum { .. })));

        let err = f
            .checkout
            .apply_coupon(f.user_id, &[line(f.kettle, 1)], "NOPE")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Coupon(CouponError::NotFound(_))));

        let applied = f.checkout.apply_coupon(f.user_id, &[line(f.kettle, 1)], "SAVE10").await.unwrap();
        assert_eq!(applied.discount_amount, Decimal::from(60));
        assert_eq!(f.usage().await, 0);
    }

    #[tokio::test]
    async fn test_online_payment_verification() {
        let f = fixture().await;
        let placed = f
            .checkout
            .place_order(
                f.user_id,
                PlaceOrder {
                    lines: vec![line(f.kettle, 1)],
                    coupon_code: None,
                    payment_method: PaymentMethod::Online,
                },
            )
            .await
            .unwrap();
        let order_id = placed.order.id;
        let gateway_order_id = placed.gateway_order_id.unwrap();
        assert_eq!(placed.order.status, OrderStatus::PendingPayment);

        let err = f
            .checkout
            .confirm_payment(order_id, f.user_id, &gateway_order_id, "pay_1", "deadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Payment(PaymentError::InvalidSignature)));
        assert_eq!(f.orders.load(order_id).await.unwrap().status, OrderStatus::PaymentFailed);

        let signature = sign_payment(SECRET, &gateway_order_id, "pay_1").unwrap();
        let order = f
            .checkout
            .confirm_payment(order_id, f.user_id, &gateway_order_id, "pay_1", &signature)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_fulfilment_updates() {
        let f = fixture().await;
        let placed = f
            .checkout
            .place_order(
                f.user_id,
                PlaceOrder {
                    lines: vec![line(f.kettle, 1)],
                    coupon_code: None,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();
        let admin = Uuid::new_v4();

        let err = f
            .checkout
            .update_item_status(placed.order.id, f.kettle, ItemStatus::Cancelled, admin)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Order(OrderError::UnsupportedFulfilmentStatus(_))));

        f.checkout.update_item_status(placed.order.id, f.kettle, ItemStatus::Shipped, admin).await.unwrap();
        let order = f
            .checkout
            .update_item_status(placed.order.id, f.kettle, ItemStatus::Delivered, admin)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(order.items[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_respect_coupon_usage_limit() {
        let f = fixture().await;
        let checkout = CheckoutService::new(
            f.orders.clone(),
            Arc::new(SlowCoupons(f.coupons.clone())),
            f.inventory.clone(),
            f.wallet.clone(),
            Arc::new(InMemoryReconciliationLog::new()),
            Arc::new(LocalGateway::new(SECRET)),
            Arc::new(Metrics::new().unwrap()),
            RetryConfig::for_conflicts(5),
        );
        let request = || PlaceOrder {
            lines: vec![line(f.kettle, 1)],
            coupon_code: Some("SAVE10".to_string()),
            payment_method: PaymentMethod::Cod,
        };

        let (first, second) = tokio::join!(
            checkout.place_order(f.user_id, request()),
            checkout.place_order(f.user_id, request()),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(err, ServiceError::Coupon(CouponError::UsageLimitReached(_))));
        assert_eq!(f.usage().await, 1);
        assert_eq!(f.stock(f.kettle).await, 4);
    }
}
