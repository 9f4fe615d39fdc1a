use chrono::{Duration, Utc};
use futures_util::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponCode, CouponRepository};
use crate::domain::inventory::InventoryRepository;
use crate::domain::order::{
    ItemRefund, ItemStatus, OrderAggregate, OrderCommand, OrderCommandHandler, OrderEvent, OrderStatus,
    Settlement,
};
use crate::domain::reconciliation::{ReconciliationEntry, ReconciliationKind, ReconciliationLog};
use crate::domain::wallet::WalletLedger;
use crate::event_sourcing::StoreError;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};
use super::access::{load_for, run_command, Actor};
use super::errors::ServiceError;

// ============================================================================
// Cancellation / Return Engine
// ============================================================================
//
// A settlement (cancellation or accepted return) is decided in memory by
// the order aggregate, then applied as a saga:
//
//   1. restore stock        (best effort, failures queued for an operator)
//   2. credit the wallet    (if the order was paid; failure queued)
//   3. append the order event at the version it was decided against
//
// Steps 1 and 2 push compensations. If step 3 is rejected they run in
// reverse; a compensation that fails goes to the reconciliation queue. A
// version conflict then reloads the order and decides again, so a racing
// duplicate either finds its request id already settled or finds the items
// no longer cancellable.
//
// ============================================================================

pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by customer";
pub const DEFAULT_ORDER_CANCEL_REASON: &str = "Order cancelled by customer";
pub const DEFAULT_ACCEPT_REASON: &str = "Return accepted";
pub const DEFAULT_DECLINE_REASON: &str = "Return declined";

/// Caller-supplied knobs for a settlement
#[derive(Debug, Clone, Default)]
pub struct SettlementOptions {
    pub reason: Option<String>,
    /// Idempotency key; a fresh one is generated when absent
    pub request_id: Option<Uuid>,
}

impl SettlementOptions {
    fn reason_or(&self, default: &str) -> String {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub order_id: Uuid,
    pub request_id: Uuid,
    pub total_refund_amount: Decimal,
    pub coupon_removed: bool,
    pub coupon_recalculated: bool,
    pub new_order_total: Decimal,
    pub order_fully_cancelled: bool,
    pub item_refunds: Vec<ItemRefund>,
    /// Status the settled items ended in
    pub item_status: ItemStatus,
    pub order_status: OrderStatus,
    pub wallet_credited: bool,
    /// The request id had already been settled; nothing was applied
    pub replayed: bool,
}

impl CancellationOutcome {
    fn from_settlement(
        order_id: Uuid,
        settlement: &Settlement,
        item_status: ItemStatus,
        wallet_credited: bool,
        replayed: bool,
    ) -> Self {
        Self {
            order_id,
            request_id: settlement.request_id,
            total_refund_amount: settlement.total_refund,
            coupon_removed: settlement.coupon_removed,
            coupon_recalculated: settlement.coupon_recalculated,
            new_order_total: settlement.new_total,
            order_fully_cancelled: settlement.order_status == OrderStatus::Cancelled,
            item_refunds: settlement.item_refunds.clone(),
            item_status,
            order_status: settlement.order_status,
            wallet_credited,
            replayed,
        }
    }
}

#[derive(Debug, Clone)]
enum SettlementRequest {
    Items(Vec<Uuid>),
    WholeOrder,
    Return(Uuid),
}

impl SettlementRequest {
    fn kind(&self) -> &'static str {
        match self {
            SettlementRequest::Items(_) | SettlementRequest::WholeOrder => "cancellation",
            SettlementRequest::Return(_) => "return",
        }
    }

    fn item_status(&self) -> ItemStatus {
        match self {
            SettlementRequest::Return(_) => ItemStatus::Returned,
            _ => ItemStatus::Cancelled,
        }
    }

    fn command(&self, request_id: Uuid, reason: String, coupon: Option<Coupon>) -> OrderCommand {
        let at = Utc::now();
        match self {
            SettlementRequest::Items(product_ids) => OrderCommand::CancelItems {
                request_id,
                product_ids: product_ids.clone(),
                reason,
                coupon,
                at,
            },
            SettlementRequest::WholeOrder => OrderCommand::CancelOrder {
                request_id,
                reason,
                coupon,
                at,
            },
            SettlementRequest::Return(product_id) => OrderCommand::AcceptReturn {
                request_id,
                product_id: *product_id,
                reason,
                coupon,
                at,
            },
        }
    }

    fn wallet_description(&self, order_id: Uuid) -> String {
        match self {
            SettlementRequest::Return(_) => format!("Refund for returned item in order {order_id}"),
            _ => format!("Refund for cancelled item(s) in order {order_id}"),
        }
    }
}

/// A side effect already applied, and how to undo it
#[derive(Debug, Clone)]
enum Compensation {
    RestockedItem { product_id: Uuid, quantity: u32 },
    WalletCredited { amount: Decimal, reference: String },
}

pub struct CancellationEngine {
    orders: Arc<OrderCommandHandler>,
    coupons: Arc<dyn CouponRepository>,
    inventory: Arc<dyn InventoryRepository>,
    wallet: Arc<WalletLedger>,
    reconciliation: Arc<dyn ReconciliationLog>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    return_window: Duration,
}

impl CancellationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<OrderCommandHandler>,
        coupons: Arc<dyn CouponRepository>,
        inventory: Arc<dyn InventoryRepository>,
        wallet: Arc<WalletLedger>,
        reconciliation: Arc<dyn ReconciliationLog>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
        return_window: Duration,
    ) -> Self {
        Self {
            orders,
            coupons,
            inventory,
            wallet,
            reconciliation,
            metrics,
            retry,
            return_window,
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Cancel a subset of the customer's line items.
    pub async fn cancel_items(
        &self,
        order_id: Uuid,
        product_ids: Vec<Uuid>,
        user_id: Uuid,
        options: SettlementOptions,
    ) -> Result<CancellationOutcome, ServiceError> {
        let reason = options.reason_or(DEFAULT_CANCEL_REASON);
        self.settle(order_id, Actor::Customer(user_id), SettlementRequest::Items(product_ids), reason, options.request_id)
            .await
    }

    /// Cancel every remaining line of the customer's order.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        options: SettlementOptions,
    ) -> Result<CancellationOutcome, ServiceError> {
        let reason = options.reason_or(DEFAULT_ORDER_CANCEL_REASON);
        self.settle(order_id, Actor::Customer(user_id), SettlementRequest::WholeOrder, reason, options.request_id)
            .await
    }

    /// Customer asks to return a delivered item; no money moves yet.
    pub async fn request_return(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
        reason: &str,
    ) -> Result<OrderAggregate, ServiceError> {
        let command = OrderCommand::RequestReturn {
            product_id,
            reason: reason.to_string(),
            return_window: self.return_window,
            at: Utc::now(),
        };
        let order = run_command(
            &self.orders,
            &self.retry,
            &self.metrics,
            "return_request",
            order_id,
            Actor::Customer(user_id),
            command,
        )
        .await?;

        tracing::info!(order_id = %order_id, product_id = %product_id, "↩️ Return requested");
        Ok(order)
    }

    /// Admin approves a pending return: refund, restock, item → Returned.
    pub async fn accept_return(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        admin_id: Uuid,
        options: SettlementOptions,
    ) -> Result<CancellationOutcome, ServiceError> {
        let reason = options.reason_or(DEFAULT_ACCEPT_REASON);
        self.settle(order_id, Actor::Admin(admin_id), SettlementRequest::Return(product_id), reason, options.request_id)
            .await
    }

    /// Admin rejects a pending return; no money moves.
    pub async fn decline_return(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        admin_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderAggregate, ServiceError> {
        let options = SettlementOptions { reason, request_id: None };
        let command = OrderCommand::DeclineReturn {
            product_id,
            reason: options.reason_or(DEFAULT_DECLINE_REASON),
            at: Utc::now(),
        };
        let order = run_command(
            &self.orders,
            &self.retry,
            &self.metrics,
            "return_decline",
            order_id,
            Actor::Admin(admin_id),
            command,
        )
        .await?;

        tracing::info!(order_id = %order_id, product_id = %product_id, order_status = %order.status, "Return declined");
        Ok(order)
    }

    // ========================================================================
    // Saga
    // ========================================================================

    async fn settle(
        &self,
        order_id: Uuid,
        actor: Actor,
        request: SettlementRequest,
        reason: String,
        request_id: Option<Uuid>,
    ) -> Result<CancellationOutcome, ServiceError> {
        let request_id = request_id.unwrap_or_else(Uuid::new_v4);

        retry_on_transient(&self.retry, "order_settlement", move |_attempt| {
            self.settle_once(order_id, actor, request.clone(), reason.clone(), request_id)
        })
        .await
    }

    async fn settle_once(
        &self,
        order_id: Uuid,
        actor: Actor,
        request: SettlementRequest,
        reason: String,
        request_id: Uuid,
    ) -> Result<CancellationOutcome, ServiceError> {
        let started = Instant::now();
        let order = load_for(&self.orders, order_id, actor).await?;

        if let Some(recorded) = order.settlement(request_id) {
            tracing::info!(
                order_id = %order_id,
                request_id = %request_id,
                "Settlement already applied, returning recorded outcome"
            );
            return Ok(CancellationOutcome::from_settlement(
                order_id,
                recorded,
                request.item_status(),
                recorded.refund_to_wallet,
                true,
            ));
        }

        let user_id = order.user_id;
        let coupon = self.coupon_definition(&order).await?;
        let command = request.command(request_id, reason, coupon);
        let decision = OrderCommandHandler::decide_on(order, &command)?;

        let settlement = decision
            .events
            .iter()
            .find_map(|event| match event {
                OrderEvent::ItemsCancelled(s) | OrderEvent::ReturnAccepted(s) => Some(s.clone()),
                _ => None,
            })
            .ok_or_else(|| ServiceError::Internal(format!("no settlement decided for order {order_id}")))?;

        let mut compensations = Vec::new();
        let mut deferred = Vec::new();

        // 1. Stock
        self.restore_stock(order_id, user_id, &settlement, &mut compensations, &mut deferred)
            .await;

        // 2. Wallet
        let mut wallet_credited = false;
        if settlement.refund_to_wallet {
            let reference = format!("refund:{request_id}:{}", Uuid::new_v4().simple());
            let description = request.wallet_description(order_id);

            match self
                .wallet
                .credit(user_id, settlement.total_refund, &description, Some(reference.clone()))
                .await
            {
                Ok(_) => {
                    wallet_credited = true;
                    compensations.push(Compensation::WalletCredited {
                        amount: settlement.total_refund,
                        reference,
                    });
                }
                Err(err) => {
                    tracing::error!(
                        order_id = %order_id,
                        request_id = %request_id,
                        amount = %settlement.total_refund,
                        error = %err,
                        "Wallet refund failed, continuing settlement"
                    );
                    self.metrics.record_side_effect_failure("wallet_credit");
                    deferred.push(ReconciliationEntry::new(
                        ReconciliationKind::WalletCreditFailed,
                        order_id,
                        user_id,
                        request_id,
                        Some(settlement.total_refund),
                        err.to_string(),
                    ));
                }
            }
        }

        // 3. Order
        if let Err(err) = self.orders.commit(&decision, request_id, Some(actor.id())).await {
            let err = ServiceError::from(err);
            if matches!(err, ServiceError::Store(StoreError::ConcurrencyConflict { .. })) {
                self.metrics.record_conflict("order_settlement");
            }
            tracing::warn!(
                order_id = %order_id,
                request_id = %request_id,
                error = %err,
                compensations = compensations.len(),
                "Order write rejected, compensating applied side effects"
            );
            self.compensate(order_id, user_id, request_id, compensations).await;
            return Err(err);
        }

        for entry in &deferred {
            self.enqueue(entry).await;
        }

        self.metrics.record_settlement(
            request.kind(),
            if wallet_credited { settlement.total_refund.to_f64().unwrap_or(0.0) } else { 0.0 },
            settlement.coupon_removed,
            settlement.coupon_recalculated,
            started.elapsed().as_secs_f64(),
        );

        tracing::info!(
            order_id = %order_id,
            request_id = %request_id,
            kind = request.kind(),
            refund = %settlement.total_refund,
            new_total = %settlement.new_total,
            order_status = %settlement.order_status,
            coupon_removed = settlement.coupon_removed,
            coupon_recalculated = settlement.coupon_recalculated,
            wallet_credited = wallet_credited,
            "✅ Settlement applied"
        );

        Ok(CancellationOutcome::from_settlement(
            order_id,
            &settlement,
            request.item_status(),
            wallet_credited,
            false,
        ))
    }

    /// Live coupon definition for the order's snapshot; `None` when the
    /// order has no active coupon or the coupon no longer exists.
    async fn coupon_definition(&self, order: &OrderAggregate) -> Result<Option<Coupon>, ServiceError> {
        let Some(code) = order
            .coupon
            .as_ref()
            .filter(|snapshot| snapshot.is_active())
            .and_then(|snapshot| snapshot.code.as_deref())
        else {
            return Ok(None);
        };

        match CouponCode::parse(code) {
            Ok(code) => Ok(self.coupons.find_by_code(&code).await?),
            Err(_) => Ok(None),
        }
    }

    async fn restore_stock(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        settlement: &Settlement,
        compensations: &mut Vec<Compensation>,
        deferred: &mut Vec<ReconciliationEntry>,
    ) {
        let results = join_all(settlement.item_refunds.iter().map(|refund| {
            self.inventory
                .adjust_stock(refund.product_id, i64::from(refund.quantity))
        }))
        .await;

        for (refund, result) in settlement.item_refunds.iter().zip(results) {
            match result {
                Ok(stock) => {
                    tracing::debug!(product_id = %refund.product_id, stock = stock, "Stock restored");
                    compensations.push(Compensation::RestockedItem {
                        product_id: refund.product_id,
                        quantity: refund.quantity,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        order_id = %order_id,
                        product_id = %refund.product_id,
                        quantity = refund.quantity,
                        error = %err,
                        "Stock restore failed, continuing settlement"
                    );
                    self.metrics.record_side_effect_failure("stock_restore");
                    deferred.push(ReconciliationEntry::new(
                        ReconciliationKind::StockRestoreFailed,
                        order_id,
                        user_id,
                        settlement.request_id,
                        None,
                        format!("restore {} x {}: {err}", refund.quantity, refund.product_id),
                    ));
                }
            }
        }
    }

    async fn compensate(&self, order_id: Uuid, user_id: Uuid, request_id: Uuid, compensations: Vec<Compensation>) {
        for compensation in compensations.into_iter().rev() {
            let (step, result) = match &compensation {
                Compensation::WalletCredited { amount, reference } => (
                    "wallet_credit",
                    self.wallet
                        .debit(
                            user_id,
                            *amount,
                            &format!("Refund reversal for order {order_id}"),
                            Some(format!("{reference}:reversal")),
                        )
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                ),
                Compensation::RestockedItem { product_id, quantity } => (
                    "stock_restore",
                    self.inventory
                        .adjust_stock(*product_id, -i64::from(*quantity))
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                ),
            };

            self.metrics.record_compensation(step, result.is_ok());
            if let Err(detail) = result {
                tracing::error!(
                    order_id = %order_id,
                    request_id = %request_id,
                    step = step,
                    error = %detail,
                    "Compensation failed"
                );
                let amount = match compensation {
                    Compensation::WalletCredited { amount, .. } => Some(amount),
                    Compensation::RestockedItem { .. } => None,
                };
                let entry = ReconciliationEntry::new(
                    ReconciliationKind::CompensationFailed,
                    order_id,
                    user_id,
                    request_id,
                    amount,
                    format!("{step}: {detail}"),
                );
                self.enqueue(&entry).await;
            }
        }
    }

    async fn enqueue(&self, entry: &ReconciliationEntry) {
        self.metrics.record_reconciliation_entry(entry.kind.as_str());
        if let Err(err) = self.reconciliation.record(entry).await {
            tracing::error!(
                entry_id = %entry.id,
                kind = %entry.kind,
                order_id = %entry.order_id,
                error = %err,
                "Failed to persist reconciliation entry"
            );
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
