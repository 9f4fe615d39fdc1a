use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::{load_aggregate, wrap_events, Aggregate, EventStore, LoadError, StoreError};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};
use super::aggregate::WalletAggregate;
use super::commands::WalletCommand;
use super::errors::WalletError;
use super::events::WalletEvent;
use super::value_objects::WalletTransaction;

// ============================================================================
// Wallet Ledger
// ============================================================================
//
// Orchestrates: Command → WalletAggregate → Events → Event Store
//
// Every write is an optimistic append at the version that was loaded. A
// concurrent writer turns into a ConcurrencyConflict, and the whole
// load/decide/append cycle is retried, so two refunds landing at the same
// time can no longer overwrite each other's balance.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Corrupt wallet stream: {0}")]
    Corrupt(String),
}

impl IsTransient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_transient())
    }
}

impl From<LoadError<WalletError>> for LedgerError {
    fn from(err: LoadError<WalletError>) -> Self {
        match err {
            LoadError::Store(e) => LedgerError::Store(e),
            LoadError::Replay(e) => LedgerError::Corrupt(e.to_string()),
        }
    }
}

/// Outcome of a credit or debit
#[derive(Debug, Clone)]
pub struct WalletReceipt {
    /// `None` when the reference had already been applied
    pub transaction: Option<WalletTransaction>,
    pub balance: Decimal,
}

pub struct WalletLedger {
    event_store: Arc<dyn EventStore<WalletEvent>>,
    retry: RetryConfig,
}

impl WalletLedger {
    pub fn new(event_store: Arc<dyn EventStore<WalletEvent>>, retry: RetryConfig) -> Self {
        Self { event_store, retry }
    }

    /// Current wallet state; an untouched wallet has a zero balance.
    pub async fn wallet(&self, user_id: Uuid) -> Result<WalletAggregate, LedgerError> {
        let wallet = load_aggregate::<WalletAggregate, _>(self.event_store.as_ref(), user_id).await?;
        Ok(wallet.unwrap_or_else(|| WalletAggregate::empty(user_id)))
    }

    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
        reference: Option<String>,
    ) -> Result<WalletReceipt, LedgerError> {
        let command = WalletCommand::Credit {
            amount,
            description: description.to_string(),
            reference,
            at: Utc::now(),
        };
        retry_on_transient(&self.retry, "wallet_credit", move |_attempt| {
            self.execute(user_id, command.clone())
        })
        .await
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
        reference: Option<String>,
    ) -> Result<WalletReceipt, LedgerError> {
        let command = WalletCommand::Debit {
            amount,
            description: description.to_string(),
            reference,
            at: Utc::now(),
        };
        retry_on_transient(&self.retry, "wallet_debit", move |_attempt| {
            self.execute(user_id, command.clone())
        })
        .await
    }

    async fn execute(&self, user_id: Uuid, command: WalletCommand) -> Result<WalletReceipt, LedgerError> {
        let mut wallet = self.wallet(user_id).await?;
        let expected_version = wallet.version();

        let events = wallet.handle_command(&command)?;
        if events.is_empty() {
            tracing::info!(user_id = %user_id, "Wallet transaction reference already applied, skipping");
            return Ok(WalletReceipt {
                transaction: None,
                balance: wallet.balance,
            });
        }

        wallet.apply_all(&events)?;
        let transaction = wallet.transactions.last().cloned();

        let envelopes = wrap_events(user_id, expected_version, events, Uuid::new_v4(), Some(user_id));
        self.event_store
            .append_events(user_id, expected_version, envelopes)
            .await?;

        if let Some(tx) = &transaction {
            tracing::info!(
                user_id = %user_id,
                kind = ?tx.kind,
                amount = %tx.amount,
                balance = %wallet.balance,
                "💰 Wallet transaction recorded"
            );
        }

        Ok(WalletReceipt {
            transaction,
            balance: wallet.balance,
        })
    }
}
