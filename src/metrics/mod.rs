use prometheus::{
    Counter, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Orders placed and payments verified
// - Cancellation / return settlements and refunded amounts
// - Coupon re-evaluation outcomes
// - Best-effort side effects that failed, compensations and the
//   reconciliation queue
// - Optimistic concurrency conflicts
//
// All metrics are registered with Prometheus and scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_placed: IntCounterVec,
    pub payments_verified: IntCounterVec,

    // Settlement Metrics
    pub settlements_total: IntCounterVec,
    pub refunded_amount: Counter,
    pub coupon_adjustments: IntCounterVec,
    pub settlement_duration: HistogramVec,

    // Saga Metrics
    pub side_effect_failures: IntCounterVec,
    pub compensations_total: IntCounterVec,
    pub reconciliation_entries: IntCounterVec,

    // Concurrency Metrics
    pub concurrency_conflicts: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_placed = IntCounterVec::new(
            Opts::new("orders_placed_total", "Total orders placed"),
            &["payment_method"],
        )?;
        registry.register(Box::new(orders_placed.clone()))?;

        let payments_verified = IntCounterVec::new(
            Opts::new("payments_verified_total", "Online payment verifications"),
            &["outcome"],
        )?;
        registry.register(Box::new(payments_verified.clone()))?;

        // Settlement Metrics
        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Cancellations and accepted returns settled"),
            &["kind"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let refunded_amount = Counter::new(
            "refunded_amount_total",
            "Total amount refunded to wallets",
        )?;
        registry.register(Box::new(refunded_amount.clone()))?;

        let coupon_adjustments = IntCounterVec::new(
            Opts::new("coupon_adjustments_total", "Coupon snapshots changed by settlements"),
            &["outcome"],
        )?;
        registry.register(Box::new(coupon_adjustments.clone()))?;

        let settlement_duration = HistogramVec::new(
            HistogramOpts::new("settlement_duration_seconds", "Settlement duration including side effects")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["kind"],
        )?;
        registry.register(Box::new(settlement_duration.clone()))?;

        // Saga Metrics
        let side_effect_failures = IntCounterVec::new(
            Opts::new("side_effect_failures_total", "Best-effort side effects that failed"),
            &["step"],
        )?;
        registry.register(Box::new(side_effect_failures.clone()))?;

        let compensations_total = IntCounterVec::new(
            Opts::new("compensations_total", "Compensating actions run after a rejected order write"),
            &["step", "outcome"],
        )?;
        registry.register(Box::new(compensations_total.clone()))?;

        let reconciliation_entries = IntCounterVec::new(
            Opts::new("reconciliation_entries_total", "Entries written to the reconciliation queue"),
            &["kind"],
        )?;
        registry.register(Box::new(reconciliation_entries.clone()))?;

        // Concurrency Metrics
        let concurrency_conflicts = IntCounterVec::new(
            Opts::new("concurrency_conflicts_total", "Optimistic concurrency conflicts"),
            &["operation"],
        )?;
        registry.register(Box::new(concurrency_conflicts.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            payments_verified,
            settlements_total,
            refunded_amount,
            coupon_adjustments,
            settlement_duration,
            side_effect_failures,
            compensations_total,
            reconciliation_entries,
            concurrency_conflicts,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format for the /metrics endpoint
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn record_order_placed(&self, payment_method: &str) {
        self.orders_placed.with_label_values(&[payment_method]).inc();
    }

    pub fn record_payment_verification(&self, success: bool) {
        let outcome = if success { "verified" } else { "rejected" };
        self.payments_verified.with_label_values(&[outcome]).inc();
    }

    /// Helper to record a committed settlement
    pub fn record_settlement(
        &self,
        kind: &str,
        refunded: f64,
        coupon_removed: bool,
        coupon_recalculated: bool,
        duration_secs: f64,
    ) {
        self.settlements_total.with_label_values(&[kind]).inc();
        if refunded > 0.0 {
            self.refunded_amount.inc_by(refunded);
        }
        if coupon_removed {
            self.coupon_adjustments.with_label_values(&["removed"]).inc();
        }
        if coupon_recalculated {
            self.coupon_adjustments.with_label_values(&["recalculated"]).inc();
        }
        self.settlement_duration.with_label_values(&[kind]).observe(duration_secs);
    }

    pub fn record_side_effect_failure(&self, step: &str) {
        self.side_effect_failures.with_label_values(&[step]).inc();
    }

    pub fn record_compensation(&self, step: &str, success: bool) {
        let outcome = if success { "applied" } else { "failed" };
        self.compensations_total.with_label_values(&[step, outcome]).inc();
    }

    pub fn record_reconciliation_entry(&self, kind: &str) {
        self.reconciliation_entries.with_label_values(&[kind]).inc();
    }

    pub fn record_conflict(&self, operation: &str) {
        self.concurrency_conflicts.with_label_values(&[operation]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_placed("COD");
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_settlement() {
        let metrics = Metrics::new().unwrap();
        metrics.record_settlement("cancellation", 433.33, false, true, 0.02);
        metrics.record_settlement("return", 0.0, true, false, 0.01);

        let gathered = metrics.registry.gather();
        let settled = gathered.iter().find(|m| m.name() == "settlements_total").unwrap();
        assert_eq!(settled.metric.len(), 2);

        let refunded = gathered.iter().find(|m| m.name() == "refunded_amount_total").unwrap();
        assert_eq!(refunded.metric[0].counter.value, Some(433.33));

        let coupons = gathered.iter().find(|m| m.name() == "coupon_adjustments_total").unwrap();
        assert_eq!(coupons.metric.len(), 2);
    }

    #[test]
    fn test_record_saga_failures() {
        let metrics = Metrics::new().unwrap();
        metrics.record_side_effect_failure("stock_restore");
        metrics.record_compensation("wallet_credit", false);
        metrics.record_reconciliation_entry("compensation_failed");
        metrics.record_reconciliation_entry("compensation_failed");

        let gathered = metrics.registry.gather();
        let queued = gathered.iter().find(|m| m.name() == "reconciliation_entries_total").unwrap();
        assert_eq!(queued.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_encode_exposes_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_conflict("order_settlement");
        let body = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(body.contains("concurrency_conflicts_total"));
    }
}
