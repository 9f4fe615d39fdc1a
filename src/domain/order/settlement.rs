use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::coupon::{Coupon, CouponSnapshot};
use crate::utils::money::round_money;
use super::value_objects::{ItemRefund, LineItem};

// ============================================================================
// Refund Planning
// ============================================================================
//
// Pure arithmetic for cancelling or returning a subset of an order's lines:
//
//   current subtotal  = Σ billable lines, taken before any status change
//   new subtotal      = current subtotal − Σ selected lines
//
//   coupon missing or new subtotal below its minimum
//       → snapshot cleared, selected lines refunded at full price
//   coupon still qualifies
//       → refund = line total − (line total / current subtotal) × old discount
//       → snapshot discount recomputed on the new subtotal
//
// The total refund never exceeds what is currently charged. When it would,
// refunds are scaled down proportionally and the last line absorbs rounding.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RefundPlan {
    pub item_refunds: Vec<ItemRefund>,
    pub total_refund: Decimal,
    pub current_subtotal: Decimal,
    pub new_subtotal: Decimal,
    pub coupon: Option<CouponSnapshot>,
    pub coupon_removed: bool,
    pub coupon_recalculated: bool,
    pub new_total: Decimal,
}

/// `selected` must reference billable lines of `items`; the caller
/// validates statuses before planning.
pub fn plan_refunds(
    items: &[LineItem],
    selected: &[Uuid],
    snapshot: Option<&CouponSnapshot>,
    definition: Option<&Coupon>,
    charged: Decimal,
) -> RefundPlan {
    let current_subtotal: Decimal = items
        .iter()
        .filter(|item| item.status.is_billable())
        .map(LineItem::total)
        .sum();

    let chosen: Vec<&LineItem> = items
        .iter()
        .filter(|item| selected.contains(&item.product_id))
        .collect();

    let cancelled_total: Decimal = chosen.iter().map(|item| item.total()).sum();
    let new_subtotal = (current_subtotal - cancelled_total).max(Decimal::ZERO);

    let mut coupon = snapshot.cloned();
    let mut coupon_removed = false;
    let mut coupon_recalculated = false;

    let refunds: Vec<Decimal> = match snapshot.filter(|s| s.is_active()) {
        Some(applied) => match definition.filter(|c| c.qualifies(new_subtotal)) {
            Some(definition) => {
                coupon_recalculated = true;
                coupon = Some(CouponSnapshot {
                    code: applied.code.clone(),
                    discount_amount: definition.calculate_discount(new_subtotal),
                });
                chosen
                    .iter()
                    .map(|item| {
                        let share = if current_subtotal.is_zero() {
                            Decimal::ZERO
                        } else {
                            round_money(item.total() * applied.discount_amount / current_subtotal)
                        };
                        (item.total() - share).max(Decimal::ZERO)
                    })
                    .collect()
            }
            None => {
                coupon_removed = true;
                coupon = Some(CouponSnapshot::cleared());
                chosen.iter().map(|item| item.total()).collect()
            }
        },
        None => chosen.iter().map(|item| item.total()).collect(),
    };

    let refunds = cap_refunds(refunds, charged.max(Decimal::ZERO));

    let discount = coupon
        .as_ref()
        .map(|c| c.discount_amount)
        .unwrap_or(Decimal::ZERO);
    let new_total = (new_subtotal - discount).max(Decimal::ZERO);

    let item_refunds: Vec<ItemRefund> = chosen
        .iter()
        .zip(refunds)
        .map(|(item, refund_amount)| ItemRefund {
            product_id: item.product_id,
            name: item.name.clone(),
            quantity: item.quantity,
            item_total: item.total(),
            refund_amount,
        })
        .collect();
    let total_refund = item_refunds.iter().map(|r| r.refund_amount).sum();

    RefundPlan {
        item_refunds,
        total_refund,
        current_subtotal,
        new_subtotal,
        coupon,
        coupon_removed,
        coupon_recalculated,
        new_total,
    }
}

fn cap_refunds(refunds: Vec<Decimal>, ceiling: Decimal) -> Vec<Decimal> {
    let requested: Decimal = refunds.iter().copied().sum();
    if requested <= ceiling || requested.is_zero() {
        return refunds;
    }

    let last = refunds.len().saturating_sub(1);
    let mut allotted = Decimal::ZERO;
    refunds
        .iter()
        .enumerate()
        .map(|(idx, refund)| {
            let scaled = if idx == last {
                ceiling - allotted
            } else {
                round_money(*refund * ceiling / requested)
            };
            allotted += scaled;
            scaled.max(Decimal::ZERO)
        })
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================
