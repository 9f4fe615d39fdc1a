use std::sync::Arc;

use crate::domain::coupon::CouponRepository;
use crate::domain::inventory::InventoryRepository;
use crate::domain::order::{OrderCommandHandler, OrderEvent};
use crate::domain::reconciliation::ReconciliationLog;
use crate::domain::wallet::{WalletEvent, WalletLedger};
use crate::event_sourcing::{EventStore, InMemoryEventStore};
use crate::health::{EventStoreProbe, HealthCheckable};
use crate::metrics::Metrics;
use crate::persistence::{InMemoryCoupons, InMemoryInventory, InMemoryReconciliationLog};
use crate::services::{AdminService, CancellationEngine, CheckoutService, PaymentGateway};
use crate::utils::RetryConfig;

/// Storage collaborators, chosen once at startup
#[derive(Clone)]
pub struct Backends {
    pub order_events: Arc<dyn EventStore<OrderEvent>>,
    pub wallet_events: Arc<dyn EventStore<WalletEvent>>,
    pub inventory: Arc<dyn InventoryRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub reconciliation: Arc<dyn ReconciliationLog>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            order_events: Arc::new(InMemoryEventStore::<OrderEvent>::new()),
            wallet_events: Arc::new(InMemoryEventStore::<WalletEvent>::new()),
            inventory: Arc::new(InMemoryInventory::new()),
            coupons: Arc::new(InMemoryCoupons::new()),
            reconciliation: Arc::new(InMemoryReconciliationLog::new()),
        }
    }
}

/// Services shared by every HTTP worker
pub struct AppState {
    pub checkout: CheckoutService,
    pub cancellation: CancellationEngine,
    pub admin: AdminService,
    pub wallet: Arc<WalletLedger>,
    pub metrics: Arc<Metrics>,
    pub health_checks: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn new(
        backends: Backends,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
        return_window: chrono::Duration,
    ) -> Self {
        let orders = Arc::new(OrderCommandHandler::new(backends.order_events.clone()));
        let wallet = Arc::new(WalletLedger::new(backends.wallet_events.clone(), retry.clone()));

        let checkout = CheckoutService::new(
            orders.clone(),
            backends.coupons.clone(),
            backends.inventory.clone(),
            wallet.clone(),
            backends.reconciliation.clone(),
            gateway,
            metrics.clone(),
            retry.clone(),
        );

        let cancellation = CancellationEngine::new(
            orders,
            backends.coupons.clone(),
            backends.inventory.clone(),
            wallet.clone(),
            backends.reconciliation.clone(),
            metrics.clone(),
            retry,
            return_window,
        );

        let admin = AdminService::new(backends.coupons, backends.inventory, backends.reconciliation);

        let health_checks: Vec<Arc<dyn HealthCheckable>> = vec![
            Arc::new(EventStoreProbe::new("order_events", backends.order_events)),
            Arc::new(EventStoreProbe::new("wallet_events", backends.wallet_events)),
        ];

        Self {
            checkout,
            cancellation,
            admin,
            wallet,
            metrics,
            health_checks,
        }
    }
}
