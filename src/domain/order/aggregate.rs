use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponSnapshot};
use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::settlement::plan_refunds;
use super::value_objects::{ItemStatus, LineItem, OrderStatus, PaymentMethod, PaymentStatus, StatusNote};

pub const MIN_RETURN_REASON_LEN: usize = 10;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Invariant restored by every event that touches lines or the coupon:
//   total_amount == Σ billable line totals − coupon discount (floored at 0)
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State (derived from events)
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub coupon: Option<CouponSnapshot>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Settlements already applied, keyed by request id
    pub processed_requests: HashMap<Uuid, Settlement>,
}

impl OrderAggregate {
    /// An order that has not been placed yet; only `Place` is accepted.
    pub fn unplaced(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 0,
            user_id: Uuid::nil(),
            items: Vec::new(),
            coupon: None,
            total_amount: Decimal::ZERO,
            status: OrderStatus::PendingPayment,
            payment_method: PaymentMethod::Cod,
            payment_status: PaymentStatus::Pending,
            gateway_order_id: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
            processed_requests: HashMap::new(),
        }
    }

    pub fn item(&self, product_id: Uuid) -> Result<&LineItem, OrderError> {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .ok_or(OrderError::ItemNotFound(product_id))
    }

    /// Σ unit price × quantity over lines that are neither cancelled nor returned
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .filter(|item| item.status.is_billable())
            .map(LineItem::total)
            .sum()
    }

    pub fn settlement(&self, request_id: Uuid) -> Option<&Settlement> {
        self.processed_requests.get(&request_id)
    }

    fn item_mut(&mut self, product_id: Uuid) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|item| item.product_id == product_id)
    }

    fn ensure_transition(&self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        if next == self.status || self.status.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrderError::InvalidOrderTransition { from: self.status, to: next })
        }
    }

    /// Order status implied by the fulfilment state of the lines still in play
    fn fulfilment_status(&self, statuses: impl Iterator<Item = ItemStatus>) -> OrderStatus {
        let active: Vec<ItemStatus> = statuses.filter(|s| *s != ItemStatus::Cancelled).collect();
        if active.is_empty() || active.contains(&ItemStatus::ReturnRequested) {
            return self.status;
        }

        let target = if active.iter().all(|s| s.is_post_delivery()) {
            OrderStatus::Delivered
        } else if active.iter().all(|s| *s == ItemStatus::Shipped || s.is_post_delivery()) {
            OrderStatus::Shipped
        } else {
            return self.status;
        };

        match (self.status, target) {
            (from, to) if from.can_transition_to(to) => to,
            // Processing → Shipped → Delivered in one step
            (OrderStatus::Processing, OrderStatus::Delivered) => OrderStatus::Delivered,
            _ => self.status,
        }
    }

    fn validate_lines(items: &[LineItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if item.unit_price < Decimal::ZERO {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id,
                    price: item.unit_price,
                });
            }
            if seen.contains(&item.product_id) {
                return Err(OrderError::DuplicateProduct(item.product_id));
            }
            seen.push(item.product_id);
        }
        Ok(())
    }

    fn cancel_selected(
        &self,
        request_id: Uuid,
        product_ids: &[Uuid],
        reason: &str,
        coupon: Option<&Coupon>,
        at: DateTime<Utc>,
    ) -> Result<Settlement, OrderError> {
        let mut selected: Vec<Uuid> = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            if selected.contains(product_id) {
                continue;
            }
            let item = self.item(*product_id)?;
            if !item.status.is_cancellable() {
                return Err(OrderError::ItemNotCancellable {
                    product_id: *product_id,
                    status: item.status,
                });
            }
            selected.push(*product_id);
        }
        if selected.is_empty() {
            return Err(OrderError::NoItemsSelected);
        }

        let remaining = self
            .items
            .iter()
            .filter(|item| !selected.contains(&item.product_id))
            .map(|item| item.status);

        let order_status = if remaining.clone().all(|s| s == ItemStatus::Cancelled) {
            self.ensure_transition(OrderStatus::Cancelled)?
        } else {
            self.fulfilment_status(remaining)
        };

        let plan = plan_refunds(&self.items, &selected, self.coupon.as_ref(), coupon, self.total_amount);

        Ok(Settlement {
            request_id,
            product_ids: selected,
            reason: reason.to_string(),
            refund_to_wallet: self.payment_status == PaymentStatus::Paid && plan.total_refund > Decimal::ZERO,
            item_refunds: plan.item_refunds,
            total_refund: plan.total_refund,
            coupon: plan.coupon,
            coupon_removed: plan.coupon_removed,
            coupon_recalculated: plan.coupon_recalculated,
            new_total: plan.new_total,
            order_status,
            settled_at: at,
        })
    }

    /// Order status once `product_id` leaves the pending-return state
    fn status_after_return_decision(&self, product_id: Uuid, returned: bool) -> OrderStatus {
        let others: Vec<ItemStatus> = self
            .items
            .iter()
            .filter(|item| item.product_id != product_id)
            .map(|item| item.status)
            .collect();

        if others.contains(&ItemStatus::ReturnRequested) {
            return OrderStatus::ReturnRequested;
        }

        // Lines still on their way put the order back into fulfilment
        let in_transit: Vec<ItemStatus> = others
            .iter()
            .copied()
            .filter(|s| s.is_awaiting_delivery())
            .collect();
        if !in_transit.is_empty() {
            return if in_transit.iter().all(|s| *s == ItemStatus::Shipped) {
                OrderStatus::Shipped
            } else {
                OrderStatus::Processing
            };
        }

        if returned || others.contains(&ItemStatus::Returned) {
            OrderStatus::Returned
        } else {
            OrderStatus::ReturnDeclined
        }
    }

    fn record_settlement(&mut self, settlement: &Settlement, status: ItemStatus) {
        let note = StatusNote {
            reason: settlement.reason.clone(),
            at: settlement.settled_at,
        };

        for product_id in &settlement.product_ids {
            if let Some(item) = self.item_mut(*product_id) {
                item.status = status;
                match status {
                    ItemStatus::Returned => item.return_resolution = Some(note.clone()),
                    _ => item.cancellation = Some(note.clone()),
                }
            }
        }

        self.coupon = settlement.coupon.clone();
        self.total_amount = settlement.new_total;
        self.status = settlement.order_status;
        self.updated_at = settlement.settled_at;
        self.processed_requests
            .insert(settlement.request_id, settlement.clone());
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => Ok(Self {
                id: aggregate_id,
                version: 0,
                user_id: e.user_id,
                items: e.items.clone(),
                coupon: e.coupon.clone(),
                total_amount: e.total_amount,
                status: e.status,
                payment_method: e.payment_method,
                payment_status: e.payment_status,
                gateway_order_id: e.gateway_order_id.clone(),
                payment_id: None,
                created_at: e.placed_at,
                updated_at: e.placed_at,
                processed_requests: HashMap::new(),
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Placed(_) => {
                let placed = Self::apply_first_event(self.id, event)?;
                *self = Self { version: self.version, ..placed };
            }
            OrderEvent::PaymentConfirmed(e) => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_id = Some(e.payment_id.clone());
                self.status = OrderStatus::Processing;
                self.updated_at = e.confirmed_at;
            }
            OrderEvent::PaymentFailed(e) => {
                self.payment_status = PaymentStatus::Failed;
                self.status = OrderStatus::PaymentFailed;
                self.updated_at = e.failed_at;
            }
            OrderEvent::ItemStatusChanged(e) => {
                let item = self
                    .item_mut(e.product_id)
                    .ok_or(OrderError::ItemNotFound(e.product_id))?;
                item.status = e.status;
                if e.status == ItemStatus::Delivered {
                    item.delivered_at = Some(e.changed_at);
                }
                self.status = e.order_status;
                self.payment_status = e.payment_status;
                self.updated_at = e.changed_at;
            }
            OrderEvent::ItemsCancelled(settlement) => {
                self.record_settlement(settlement, ItemStatus::Cancelled);
            }
            OrderEvent::ReturnRequested(e) => {
                let item = self
                    .item_mut(e.product_id)
                    .ok_or(OrderError::ItemNotFound(e.product_id))?;
                item.status = ItemStatus::ReturnRequested;
                item.return_request = Some(StatusNote {
                    reason: e.reason.clone(),
                    at: e.requested_at,
                });
                self.status = OrderStatus::ReturnRequested;
                self.updated_at = e.requested_at;
            }
            OrderEvent::ReturnAccepted(settlement) => {
                self.record_settlement(settlement, ItemStatus::Returned);
            }
            OrderEvent::ReturnDeclined(e) => {
                let item = self
                    .item_mut(e.product_id)
                    .ok_or(OrderError::ItemNotFound(e.product_id))?;
                item.status = ItemStatus::ReturnDeclined;
                item.return_resolution = Some(StatusNote {
                    reason: e.reason.clone(),
                    at: e.declined_at,
                });
                self.status = e.order_status;
                self.updated_at = e.declined_at;
            }
        }
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let OrderCommand::Place { .. } = command {
            if self.version != 0 {
                return Err(OrderError::AlreadyPlaced);
            }
        } else if self.version == 0 {
            return Err(OrderError::NotInitialized);
        }

        if let Some(request_id) = command.request_id() {
            if self.processed_requests.contains_key(&request_id) {
                return Ok(vec![]); // Already settled
            }
        }

        match command {
            OrderCommand::Place { user_id, items, coupon, payment_method, gateway_order_id, at } => {
                Self::validate_lines(items)?;

                let subtotal: Decimal = items.iter().map(LineItem::total).sum();
                let discount = coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount_amount);
                let (status, payment_status) = match payment_method {
                    PaymentMethod::Online => (OrderStatus::PendingPayment, PaymentStatus::Pending),
                    PaymentMethod::Wallet => (OrderStatus::Processing, PaymentStatus::Paid),
                    PaymentMethod::Cod => (OrderStatus::Processing, PaymentStatus::Pending),
                };

                Ok(vec![OrderEvent::Placed(OrderPlaced {
                    user_id: *user_id,
                    items: items
                        .iter()
                        .cloned()
                        .map(|item| LineItem { status: ItemStatus::Placed, ..item })
                        .collect(),
                    coupon: coupon.clone(),
                    total_amount: (subtotal - discount).max(Decimal::ZERO),
                    payment_method: *payment_method,
                    payment_status,
                    status,
                    gateway_order_id: gateway_order_id.clone(),
                    placed_at: *at,
                })])
            }

            OrderCommand::ConfirmPayment { payment_id, at } => {
                if self.payment_status == PaymentStatus::Paid {
                    return Err(OrderError::PaymentNotPending(self.payment_status));
                }
                match self.status {
                    OrderStatus::PendingPayment | OrderStatus::PaymentFailed => {}
                    from => return Err(OrderError::InvalidOrderTransition { from, to: OrderStatus::Processing }),
                }

                Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmed {
                    payment_id: payment_id.clone(),
                    confirmed_at: *at,
                })])
            }

            OrderCommand::FailPayment { reason, at } => {
                if self.payment_status == PaymentStatus::Paid {
                    return Err(OrderError::PaymentNotPending(self.payment_status));
                }
                self.ensure_transition(OrderStatus::PaymentFailed)?;

                Ok(vec![OrderEvent::PaymentFailed(PaymentFailed {
                    reason: reason.clone(),
                    failed_at: *at,
                })])
            }

            OrderCommand::UpdateItemStatus { product_id, status, at } => {
                if !matches!(status, ItemStatus::Processing | ItemStatus::Shipped | ItemStatus::Delivered) {
                    return Err(OrderError::UnsupportedFulfilmentStatus(*status));
                }
                if matches!(self.status, OrderStatus::PendingPayment | OrderStatus::PaymentFailed) {
                    return Err(OrderError::AwaitingPayment);
                }

                let item = self.item(*product_id)?;
                if !item.status.can_transition_to(*status) {
                    return Err(OrderError::InvalidItemTransition {
                        product_id: *product_id,
                        from: item.status,
                        to: *status,
                    });
                }

                let statuses = self.items.iter().map(|i| {
                    if i.product_id == *product_id { *status } else { i.status }
                });
                let all_delivered = statuses
                    .clone()
                    .filter(|s| *s != ItemStatus::Cancelled)
                    .all(ItemStatus::is_post_delivery);
                let order_status = self.fulfilment_status(statuses);

                // Cash on delivery is collected once the whole order arrives
                let payment_status = if all_delivered && self.payment_method == PaymentMethod::Cod {
                    PaymentStatus::Paid
                } else {
                    self.payment_status
                };

                Ok(vec![OrderEvent::ItemStatusChanged(ItemStatusChanged {
                    product_id: *product_id,
                    status: *status,
                    order_status,
                    payment_status,
                    changed_at: *at,
                })])
            }

            OrderCommand::CancelItems { request_id, product_ids, reason, coupon, at } => {
                let settlement = self.cancel_selected(*request_id, product_ids, reason, coupon.as_ref(), *at)?;
                Ok(vec![OrderEvent::ItemsCancelled(settlement)])
            }

            OrderCommand::CancelOrder { request_id, reason, coupon, at } => {
                if !self.status.allows_order_cancel() {
                    return Err(OrderError::OrderNotCancellable(self.status));
                }
                if self.items.iter().any(|item| item.status.is_post_delivery()) {
                    return Err(OrderError::OrderHasDeliveredItems);
                }

                let selected: Vec<Uuid> = self
                    .items
                    .iter()
                    .filter(|item| item.status.is_cancellable())
                    .map(|item| item.product_id)
                    .collect();
                if selected.is_empty() {
                    return Err(OrderError::NothingToCancel);
                }

                let settlement = self.cancel_selected(*request_id, &selected, reason, coupon.as_ref(), *at)?;
                Ok(vec![OrderEvent::ItemsCancelled(settlement)])
            }

            OrderCommand::RequestReturn { product_id, reason, return_window, at } => {
                let reason = reason.trim();
                if reason.chars().count() < MIN_RETURN_REASON_LEN {
                    return Err(OrderError::ReasonTooShort(MIN_RETURN_REASON_LEN));
                }

                let item = self.item(*product_id)?;
                if item.status != ItemStatus::Delivered {
                    return Err(OrderError::ItemNotReturnable {
                        product_id: *product_id,
                        status: item.status,
                    });
                }
                if item.delivered_at.is_some_and(|delivered| *at - delivered > *return_window) {
                    return Err(OrderError::ReturnWindowExpired {
                        product_id: *product_id,
                        days: return_window.num_days(),
                    });
                }
                if self.status != OrderStatus::ReturnRequested
                    && !self.status.can_transition_to(OrderStatus::ReturnRequested)
                {
                    return Err(OrderError::OrderNotReturnable(self.status));
                }

                Ok(vec![OrderEvent::ReturnRequested(ReturnRequested {
                    product_id: *product_id,
                    reason: reason.to_string(),
                    requested_at: *at,
                })])
            }

            OrderCommand::AcceptReturn { request_id, product_id, reason, coupon, at } => {
                let item = self.item(*product_id)?;
                if item.status != ItemStatus::ReturnRequested {
                    return Err(OrderError::NoPendingReturn(*product_id));
                }

                let plan = plan_refunds(
                    &self.items,
                    &[*product_id],
                    self.coupon.as_ref(),
                    coupon.as_ref(),
                    self.total_amount,
                );
                let order_status = self.status_after_return_decision(*product_id, true);

                Ok(vec![OrderEvent::ReturnAccepted(Settlement {
                    request_id: *request_id,
                    product_ids: vec![*product_id],
                    reason: reason.clone(),
                    refund_to_wallet: self.payment_status == PaymentStatus::Paid
                        && plan.total_refund > Decimal::ZERO,
                    item_refunds: plan.item_refunds,
                    total_refund: plan.total_refund,
                    coupon: plan.coupon,
                    coupon_removed: plan.coupon_removed,
                    coupon_recalculated: plan.coupon_recalculated,
                    new_total: plan.new_total,
                    order_status,
                    settled_at: *at,
                })])
            }

            OrderCommand::DeclineReturn { product_id, reason, at } => {
                let item = self.item(*product_id)?;
                if item.status != ItemStatus::ReturnRequested {
                    return Err(OrderError::NoPendingReturn(*product_id));
                }

                Ok(vec![OrderEvent::ReturnDeclined(ReturnDeclined {
                    product_id: *product_id,
                    reason: reason.clone(),
                    order_status: self.status_after_return_decision(*product_id, false),
                    declined_at: *at,
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::NewCoupon;
    use chrono::Duration;

    fn save20() -> Coupon {
        Coupon::create(
            NewCoupon {
                code: "SAVE20".to_string(),
                discount: Decimal::from(20),
                minimum_amount: Decimal::from(1000),
                max_discount: None,
                usage_limit: 5,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn execute(order: &mut OrderAggregate, command: OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        let events = order.handle_command(&command)?;
        order.apply_all(&events)?;
        Ok(events)
    }

    /// A(500) B(600) C(400) with SAVE20 snapshot of 200, charged 1300
    fn placed(method: PaymentMethod) -> OrderAggregate {
        let mut order = OrderAggregate::unplaced(Uuid::new_v4());
        let items = vec![
            LineItem::new(Uuid::new_v4(), "A", 1, Decimal::from(500)),
            LineItem::new(Uuid::new_v4(), "B", 1, Decimal::from(600)),
            LineItem::new(Uuid::new_v4(), "C", 1, Decimal::from(400)),
        ];
        execute(
            &mut order,
            OrderCommand::Place {
                user_id: Uuid::new_v4(),
                items,
                coupon: Some(CouponSnapshot {
                    code: Some("SAVE20".to_string()),
                    discount_amount: Decimal::from(200),
                }),
                payment_method: method,
                gateway_order_id: None,
                at: Utc::now(),
            },
        )
        .unwrap();
        order
    }

    fn product(order: &OrderAggregate, idx: usize) -> Uuid {
        order.items[idx].product_id
    }

    fn cancel(order: &mut OrderAggregate, ids: Vec<Uuid>) -> Result<Settlement, OrderError> {
        let request_id = Uuid::new_v4();
        execute(
            order,
            OrderCommand::CancelItems {
                request_id,
                product_ids: ids,
                reason: "Changed my mind".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            },
        )?;
        Ok(order.settlement(request_id).cloned().unwrap())
    }

    fn set_status(order: &mut OrderAggregate, idx: usize, status: ItemStatus) {
        let product_id = product(order, idx);
        execute(order, OrderCommand::UpdateItemStatus { product_id, status, at: Utc::now() }).unwrap();
    }

    fn deliver_all(order: &mut OrderAggregate) {
        for idx in 0..order.items.len() {
            set_status(order, idx, ItemStatus::Shipped);
            set_status(order, idx, ItemStatus::Delivered);
        }
    }

    fn assert_total_invariant(order: &OrderAggregate) {
        let discount = order.coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount_amount);
        assert_eq!(order.total_amount, (order.subtotal() - discount).max(Decimal::ZERO));
    }

    #[test]
    fn test_place_sets_totals_and_status_by_payment_method() {
        let order = placed(PaymentMethod::Online);
        assert_eq!(order.total_amount, Decimal::from(1300));
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.version, 1);

        let order = placed(PaymentMethod::Wallet);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        let order = placed(PaymentMethod::Cod);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_place_rejects_bad_lines() {
        let order = OrderAggregate::unplaced(Uuid::new_v4());
        let product_id = Uuid::new_v4();
        let place = |items: Vec<LineItem>| OrderCommand::Place {
            user_id: Uuid::new_v4(),
            items,
            coupon: None,
            payment_method: PaymentMethod::Cod,
            gateway_order_id: None,
            at: Utc::now(),
        };

        assert_eq!(order.handle_command(&place(vec![])).unwrap_err(), OrderError::EmptyItems);
        assert!(matches!(
            order.handle_command(&place(vec![LineItem::new(product_id, "A", 0, Decimal::ONE)])),
            Err(OrderError::InvalidQuantity { .. })
        ));
        let dup = vec![
            LineItem::new(product_id, "A", 1, Decimal::ONE),
            LineItem::new(product_id, "A", 2, Decimal::ONE),
        ];
        assert_eq!(order.handle_command(&place(dup)).unwrap_err(), OrderError::DuplicateProduct(product_id));
    }

    #[test]
    fn test_cancel_single_item_recalculates_coupon() {
        let mut order = placed(PaymentMethod::Wallet);
        let a = product(&order, 0);

        let settlement = cancel(&mut order, vec![a]).unwrap();

        assert_eq!(settlement.total_refund, Decimal::new(43333, 2));
        assert!(settlement.coupon_recalculated);
        assert!(settlement.refund_to_wallet);
        assert_eq!(order.total_amount, Decimal::from(800));
        assert_eq!(order.item(a).unwrap().status, ItemStatus::Cancelled);
        assert!(order.item(a).unwrap().cancellation.is_some());
        assert_eq!(order.status, OrderStatus::Processing);
        assert_total_invariant(&order);
    }

    #[test]
    fn test_cancel_below_minimum_clears_coupon() {
        let mut order = placed(PaymentMethod::Online);
        let ids = vec![product(&order, 1), product(&order, 2)];

        let settlement = cancel(&mut order, ids).unwrap();

        assert!(settlement.coupon_removed);
        assert_eq!(settlement.total_refund, Decimal::from(1000));
        assert_eq!(order.coupon, Some(CouponSnapshot::cleared()));
        assert_eq!(order.total_amount, Decimal::from(500));
        assert_total_invariant(&order);
    }

    #[test]
    fn test_cancel_everything_cancels_order() {
        let mut order = placed(PaymentMethod::Wallet);
        let ids: Vec<Uuid> = order.items.iter().map(|i| i.product_id).collect();

        let settlement = cancel(&mut order, ids).unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.total_amount, Decimal::ZERO);
        assert_eq!(settlement.total_refund, Decimal::from(1300));
        assert_eq!(order.coupon, Some(CouponSnapshot::cleared()));
    }

    #[test]
    fn test_cod_cancellation_owes_no_wallet_refund() {
        let mut order = placed(PaymentMethod::Cod);
        let id = product(&order, 0);
        let settlement = cancel(&mut order, vec![id]).unwrap();
        assert!(!settlement.refund_to_wallet);
        assert!(settlement.total_refund > Decimal::ZERO);
    }

    #[test]
    fn test_wallet_refund_follows_payment_status_not_method() {
        let mut unpaid = placed(PaymentMethod::Online);
        let id = product(&unpaid, 0);
        let settlement = cancel(&mut unpaid, vec![id]).unwrap();
        assert!(!settlement.refund_to_wallet);

        let mut paid = placed(PaymentMethod::Online);
        execute(&mut paid, OrderCommand::ConfirmPayment { payment_id: "pay_1".to_string(), at: Utc::now() }).unwrap();
        let id = product(&paid, 0);
        let settlement = cancel(&mut paid, vec![id]).unwrap();
        assert!(settlement.refund_to_wallet);
    }

    #[test]
    fn test_cancelled_item_cannot_be_cancelled_again() {
        let mut order = placed(PaymentMethod::Wallet);
        let a = product(&order, 0);
        cancel(&mut order, vec![a]).unwrap();

        let err = cancel(&mut order, vec![a]).unwrap_err();
        assert_eq!(err, OrderError::ItemNotCancellable { product_id: a, status: ItemStatus::Cancelled });
    }

    #[test]
    fn test_replayed_request_id_is_a_no_op() {
        let mut order = placed(PaymentMethod::Wallet);
        let command = OrderCommand::CancelItems {
            request_id: Uuid::new_v4(),
            product_ids: vec![product(&order, 0)],
            reason: "Duplicate submit".to_string(),
            coupon: Some(save20()),
            at: Utc::now(),
        };

        assert_eq!(execute(&mut order, command.clone()).unwrap().len(), 1);
        assert!(execute(&mut order, command).unwrap().is_empty());
        assert_eq!(order.version, 2);
    }

    #[test]
    fn test_unknown_item_and_empty_selection() {
        let mut order = placed(PaymentMethod::Wallet);
        let missing = Uuid::new_v4();
        assert_eq!(cancel(&mut order, vec![missing]).unwrap_err(), OrderError::ItemNotFound(missing));
        assert_eq!(cancel(&mut order, vec![]).unwrap_err(), OrderError::NoItemsSelected);
    }

    #[test]
    fn test_shipped_item_is_cancellable_delivered_is_not() {
        let mut order = placed(PaymentMethod::Wallet);
        set_status(&mut order, 0, ItemStatus::Shipped);
        let id = product(&order, 0);
        cancel(&mut order, vec![id]).unwrap();

        set_status(&mut order, 1, ItemStatus::Shipped);
        set_status(&mut order, 1, ItemStatus::Delivered);
        let id = product(&order, 1);
        let err = cancel(&mut order, vec![id]).unwrap_err();
        assert!(matches!(err, OrderError::ItemNotCancellable { status: ItemStatus::Delivered, .. }));
    }

    #[test]
    fn test_cancel_order_gating() {
        let mut order = placed(PaymentMethod::Wallet);
        set_status(&mut order, 0, ItemStatus::Shipped);
        set_status(&mut order, 0, ItemStatus::Delivered);

        let err = order
            .handle_command(&OrderCommand::CancelOrder {
                request_id: Uuid::new_v4(),
                reason: "No longer needed".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(err, OrderError::OrderHasDeliveredItems);

        let mut order = placed(PaymentMethod::Wallet);
        deliver_all(&mut order);
        let err = order
            .handle_command(&OrderCommand::CancelOrder {
                request_id: Uuid::new_v4(),
                reason: "No longer needed".to_string(),
                coupon: None,
                at: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(err, OrderError::OrderNotCancellable(OrderStatus::Delivered));
    }

    #[test]
    fn test_cancel_order_skips_already_cancelled_items() {
        let mut order = placed(PaymentMethod::Wallet);
        let id = product(&order, 0);
        cancel(&mut order, vec![id]).unwrap();

        let request_id = Uuid::new_v4();
        execute(
            &mut order,
            OrderCommand::CancelOrder {
                request_id,
                reason: "No longer needed".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            },
        )
        .unwrap();

        let settlement = order.settlement(request_id).unwrap();
        assert_eq!(settlement.product_ids.len(), 2);
        assert_eq!(settlement.total_refund, Decimal::from(800));
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.total_amount, Decimal::ZERO);
    }

    #[test]
    fn test_fulfilment_drives_order_status_and_cod_payment() {
        let mut order = placed(PaymentMethod::Cod);
        for idx in 0..3 {
            set_status(&mut order, idx, ItemStatus::Shipped);
        }
        assert_eq!(order.status, OrderStatus::Shipped);

        for idx in 0..3 {
            set_status(&mut order, idx, ItemStatus::Delivered);
        }
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(order.items.iter().all(|i| i.delivered_at.is_some()));
    }

    #[test]
    fn test_fulfilment_blocked_until_paid_and_by_transition_table() {
        let mut order = placed(PaymentMethod::Online);
        let a = product(&order, 0);
        let ship = OrderCommand::UpdateItemStatus { product_id: a, status: ItemStatus::Shipped, at: Utc::now() };
        assert_eq!(order.handle_command(&ship).unwrap_err(), OrderError::AwaitingPayment);

        execute(&mut order, OrderCommand::ConfirmPayment { payment_id: "pay_1".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        let deliver = OrderCommand::UpdateItemStatus { product_id: a, status: ItemStatus::Delivered, at: Utc::now() };
        assert!(matches!(order.handle_command(&deliver), Err(OrderError::InvalidItemTransition { .. })));

        let cancel_via_update = OrderCommand::UpdateItemStatus { product_id: a, status: ItemStatus::Cancelled, at: Utc::now() };
        assert_eq!(
            order.handle_command(&cancel_via_update).unwrap_err(),
            OrderError::UnsupportedFulfilmentStatus(ItemStatus::Cancelled)
        );
    }

    #[test]
    fn test_payment_failure_then_retry() {
        let mut order = placed(PaymentMethod::Online);
        execute(&mut order, OrderCommand::FailPayment { reason: "Signature mismatch".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentFailed);

        execute(&mut order, OrderCommand::ConfirmPayment { payment_id: "pay_2".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        let again = OrderCommand::ConfirmPayment { payment_id: "pay_3".to_string(), at: Utc::now() };
        assert_eq!(order.handle_command(&again).unwrap_err(), OrderError::PaymentNotPending(PaymentStatus::Paid));
    }

    fn request_return(order: &mut OrderAggregate, idx: usize, reason: &str, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        let product_id = product(order, idx);
        execute(
            order,
            OrderCommand::RequestReturn {
                product_id,
                reason: reason.to_string(),
                return_window: Duration::days(7),
                at,
            },
        )
    }

    #[test]
    fn test_return_request_validation() {
        let mut order = placed(PaymentMethod::Cod);
        assert!(matches!(
            request_return(&mut order, 0, "Arrived damaged", Utc::now()),
            Err(OrderError::ItemNotReturnable { .. })
        ));

        deliver_all(&mut order);
        assert_eq!(
            request_return(&mut order, 0, "  broken  ", Utc::now()).unwrap_err(),
            OrderError::ReasonTooShort(MIN_RETURN_REASON_LEN)
        );
        assert!(matches!(
            request_return(&mut order, 0, "Arrived damaged", Utc::now() + Duration::days(8)),
            Err(OrderError::ReturnWindowExpired { days: 7, .. })
        ));

        request_return(&mut order, 0, "Arrived damaged", Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);
        assert_eq!(order.items[0].status, ItemStatus::ReturnRequested);
        assert!(matches!(
            request_return(&mut order, 0, "Arrived damaged", Utc::now()),
            Err(OrderError::ItemNotReturnable { status: ItemStatus::ReturnRequested, .. })
        ));
    }

    #[test]
    fn test_accept_and_decline_returns() {
        let mut order = placed(PaymentMethod::Cod);
        deliver_all(&mut order);
        request_return(&mut order, 0, "Arrived damaged", Utc::now()).unwrap();
        request_return(&mut order, 1, "Wrong size sent", Utc::now()).unwrap();

        let request_id = Uuid::new_v4();
        let product_id = product(&order, 0);
        execute(
            &mut order,
            OrderCommand::AcceptReturn {
                request_id,
                product_id,
                reason: "Return approved".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            },
        )
        .unwrap();

        let settlement = order.settlement(request_id).unwrap();
        assert_eq!(settlement.total_refund, Decimal::new(43333, 2));
        assert!(settlement.refund_to_wallet);
        assert_eq!(order.items[0].status, ItemStatus::Returned);
        assert_eq!(order.status, OrderStatus::ReturnRequested);
        assert_eq!(order.total_amount, Decimal::from(800));

        let product_id = product(&order, 1);
        execute(
            &mut order,
            OrderCommand::DeclineReturn {
                product_id,
                reason: "Item was used".to_string(),
                at: Utc::now(),
            },
        )
        .unwrap();
        assert_eq!(order.items[1].status, ItemStatus::ReturnDeclined);
        assert_eq!(order.status, OrderStatus::Returned);
        assert_total_invariant(&order);
    }

    #[test]
    fn test_decline_only_return_ends_declined() {
        let mut order = placed(PaymentMethod::Wallet);
        deliver_all(&mut order);
        request_return(&mut order, 2, "Not as described", Utc::now()).unwrap();

        let product_id = product(&order, 2);
        execute(&mut order, OrderCommand::DeclineReturn { product_id, reason: "Outside policy".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnDeclined);

        let again = OrderCommand::DeclineReturn { product_id, reason: "Outside policy".to_string(), at: Utc::now() };
        assert_eq!(order.handle_command(&again).unwrap_err(), OrderError::NoPendingReturn(product_id));
    }

    #[test]
    fn test_items_stay_returnable_after_an_earlier_return_settles() {
        let mut order = placed(PaymentMethod::Wallet);
        deliver_all(&mut order);

        request_return(&mut order, 0, "Arrived damaged", Utc::now()).unwrap();
        let product_id = product(&order, 0);
        execute(
            &mut order,
            OrderCommand::AcceptReturn {
                request_id: Uuid::new_v4(),
                product_id,
                reason: "Return approved".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            },
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Returned);

        request_return(&mut order, 1, "Wrong size sent", Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);

        let product_id = product(&order, 1);
        execute(&mut order, OrderCommand::DeclineReturn { product_id, reason: "Item was used".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.status, OrderStatus::Returned);

        request_return(&mut order, 2, "Not as described", Utc::now()).unwrap();
        assert_eq!(order.items[2].status, ItemStatus::ReturnRequested);
    }

    #[test]
    fn test_delivered_item_returnable_while_others_in_transit() {
        let mut order = placed(PaymentMethod::Cod);
        set_status(&mut order, 0, ItemStatus::Shipped);
        set_status(&mut order, 0, ItemStatus::Delivered);
        set_status(&mut order, 1, ItemStatus::Shipped);
        assert_eq!(order.status, OrderStatus::Processing);

        request_return(&mut order, 0, "Arrived damaged", Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);

        // Shipping another line does not hide the pending return
        set_status(&mut order, 2, ItemStatus::Shipped);
        assert_eq!(order.status, OrderStatus::ReturnRequested);

        let product_id = product(&order, 0);
        execute(&mut order, OrderCommand::DeclineReturn { product_id, reason: "Item was used".to_string(), at: Utc::now() }).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);

        set_status(&mut order, 1, ItemStatus::Delivered);
        set_status(&mut order, 2, ItemStatus::Delivered);
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_replay_rebuilds_same_state() {
        let mut order = placed(PaymentMethod::Wallet);
        let mut history = Vec::new();
        let user_id = order.user_id;
        let events = order
            .handle_command(&OrderCommand::CancelItems {
                request_id: Uuid::new_v4(),
                product_ids: vec![product(&order, 0)],
                reason: "Changed my mind".to_string(),
                coupon: Some(save20()),
                at: Utc::now(),
            })
            .unwrap();
        order.apply_all(&events).unwrap();

        let placed_event = OrderEvent::Placed(OrderPlaced {
            user_id,
            items: order.items.iter().cloned().map(|i| LineItem { status: ItemStatus::Placed, cancellation: None, ..i }).collect(),
            coupon: Some(CouponSnapshot { code: Some("SAVE20".to_string()), discount_amount: Decimal::from(200) }),
            total_amount: Decimal::from(1300),
            payment_method: PaymentMethod::Wallet,
            payment_status: PaymentStatus::Paid,
            status: OrderStatus::Processing,
            gateway_order_id: None,
            placed_at: order.created_at,
        });
        history.push(placed_event);
        history.extend(events);

        let envelopes = crate::event_sourcing::wrap_events(order.id, 0, history, Uuid::new_v4(), None);
        let rebuilt = OrderAggregate::load_from_events(&envelopes).unwrap().unwrap();

        assert_eq!(rebuilt.version, 2);
        assert_eq!(rebuilt.total_amount, order.total_amount);
        assert_eq!(rebuilt.items, order.items);
        assert_eq!(rebuilt.processed_requests.len(), 1);
    }
}
