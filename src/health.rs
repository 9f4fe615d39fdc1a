use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::{DomainEvent, EventStore};

// ============================================================================
// Health Check Abstractions
// ============================================================================
//
// Each backing store reports its own health; `/health` folds them into one
// report whose status is the worst component status.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Unhealthy(_) => 2,
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Anything `/health` can probe
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn check_health(&self) -> ComponentHealth;

    fn component_name(&self) -> &str;
}

/// Probes an event store with a cheap version read on a nil stream
pub struct EventStoreProbe<E: DomainEvent + 'static> {
    name: String,
    store: Arc<dyn EventStore<E>>,
}

impl<E: DomainEvent + 'static> EventStoreProbe<E> {
    pub fn new(name: impl Into<String>, store: Arc<dyn EventStore<E>>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> HealthCheckable for EventStoreProbe<E> {
    async fn check_health(&self) -> ComponentHealth {
        let status = match self.store.current_version(Uuid::nil()).await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        ComponentHealth::new(self.name.clone(), status).with_details(self.store.backend_name())
    }

    fn component_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let status = components
            .iter()
            .map(|c| c.status.clone())
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);
        Self { status, components }
    }
}

pub async fn check_all(checks: &[Arc<dyn HealthCheckable>]) -> HealthReport {
    let components = futures_util::future::join_all(checks.iter().map(|c| c.check_health())).await;
    HealthReport::from_components(components)
}
