use actix_web::{web, App, HttpServer};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod domain;
mod event_sourcing;
mod health;
mod metrics;
mod persistence;
mod services;
mod utils;

use api::{AppState, Backends};
use config::{ServiceConfig, StoreBackend};
use domain::order::OrderEvent;
use domain::wallet::WalletEvent;
use event_sourcing::ScyllaEventStore;
use persistence::{ScyllaCoupons, ScyllaInventory, ScyllaReconciliationLog, ORDER_EVENTS_TABLE, WALLET_EVENTS_TABLE};
use services::LocalGateway;
use utils::RetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load()?;

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting storefront order service");

    // === 1. Storage ===
    let backends = match config.store {
        StoreBackend::Scylla => {
            tracing::info!(nodes = ?config.scylla_nodes, keyspace = %config.keyspace, "Connecting to ScyllaDB...");
            let session: Session = SessionBuilder::new()
                .known_nodes(&config.scylla_nodes)
                .build()
                .await?;
            persistence::ensure_schema(&session, &config.keyspace).await?;
            let session = Arc::new(session);

            Backends {
                order_events: Arc::new(ScyllaEventStore::<OrderEvent>::new(session.clone(), ORDER_EVENTS_TABLE)),
                wallet_events: Arc::new(ScyllaEventStore::<WalletEvent>::new(session.clone(), WALLET_EVENTS_TABLE)),
                inventory: Arc::new(ScyllaInventory::new(session.clone())),
                coupons: Arc::new(ScyllaCoupons::new(session.clone())),
                reconciliation: Arc::new(ScyllaReconciliationLog::new(session)),
            }
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; all data is lost on restart");
            Backends::in_memory()
        }
    };

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Services ===
    let state = web::Data::new(AppState::new(
        backends,
        Arc::new(LocalGateway::new(config.payment_key_secret.clone())),
        metrics,
        RetryConfig::for_conflicts(config.conflict_retry_attempts),
        config.return_window(),
    ));

    // === 4. HTTP ===
    let addr = config.socket_addr();
    tracing::info!("🌐 Listening on http://{}", addr);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(addr)?
        .run()
        .await?;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}
