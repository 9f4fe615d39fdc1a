use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::event_sourcing::StoreError;

// ============================================================================
// Reconciliation Queue
// ============================================================================
//
// Side effects of a cancellation or return that could neither be applied
// nor rolled back end up here for an operator. Entries carry the request id
// so the operator can match them with the order's settlement.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationKind {
    /// Refund owed to the wallet was never credited
    WalletCreditFailed,
    /// A compensating action failed after the order write was rejected
    CompensationFailed,
    /// Stock could not be put back for a cancelled or returned line
    StockRestoreFailed,
}

impl ReconciliationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationKind::WalletCreditFailed => "wallet_credit_failed",
            ReconciliationKind::CompensationFailed => "compensation_failed",
            ReconciliationKind::StockRestoreFailed => "stock_restore_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wallet_credit_failed" => Some(ReconciliationKind::WalletCreditFailed),
            "compensation_failed" => Some(ReconciliationKind::CompensationFailed),
            "stock_restore_failed" => Some(ReconciliationKind::StockRestoreFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub request_id: Uuid,
    pub kind: ReconciliationKind,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    pub fn new(
        kind: ReconciliationKind,
        order_id: Uuid,
        user_id: Uuid,
        request_id: Uuid,
        amount: Option<Decimal>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            user_id,
            request_id,
            kind,
            amount,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, entry: &ReconciliationEntry) -> Result<(), StoreError>;

    /// Oldest first, at most `limit` entries
    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>, StoreError>;
}
