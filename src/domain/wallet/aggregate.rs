use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::event_sourcing::Aggregate;
use super::commands::WalletCommand;
use super::errors::WalletError;
use super::events::*;
use super::value_objects::{TransactionKind, WalletTransaction};

// ============================================================================
// Wallet Aggregate - one per user, id = user id
// ============================================================================
//
// The balance is derived from the transaction log, so
// balance == Σ credits − Σ debits holds by construction.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WalletAggregate {
    pub user_id: Uuid,
    pub version: i64,
    pub balance: Decimal,
    pub transactions: Vec<WalletTransaction>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WalletAggregate {
    /// A wallet that has never been written to
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            version: 0,
            balance: Decimal::ZERO,
            transactions: Vec::new(),
            updated_at: None,
        }
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.reference.as_deref() == Some(reference))
    }

    fn record(&mut self, transaction: &WalletTransaction) {
        self.balance += transaction.signed_amount();
        self.updated_at = Some(transaction.date);
        self.transactions.push(transaction.clone());
    }

    fn validate(amount: Decimal, description: &str) -> Result<(), WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(amount));
        }
        if description.trim().is_empty() {
            return Err(WalletError::EmptyDescription);
        }
        Ok(())
    }

    fn transaction(
        kind: TransactionKind,
        amount: Decimal,
        description: &str,
        reference: &Option<String>,
        at: DateTime<Utc>,
    ) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            amount,
            kind,
            description: description.trim().to_string(),
            reference: reference.clone(),
            date: at,
        }
    }
}

impl Aggregate for WalletAggregate {
    type Event = WalletEvent;
    type Command = WalletCommand;
    type Error = WalletError;

    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error> {
        let mut wallet = Self::empty(aggregate_id);
        wallet.apply_event(event)?;
        Ok(wallet)
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            WalletEvent::Credited(e) => self.record(&e.transaction),
            WalletEvent::Debited(e) => self.record(&e.transaction),
        }
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WalletCommand::Credit { amount, description, reference, at } => {
                Self::validate(*amount, description)?;

                if reference.as_deref().is_some_and(|r| self.has_reference(r)) {
                    return Ok(vec![]); // Already applied
                }

                Ok(vec![WalletEvent::Credited(WalletCredited {
                    transaction: Self::transaction(TransactionKind::Credit, *amount, description, reference, *at),
                })])
            }

            WalletCommand::Debit { amount, description, reference, at } => {
                Self::validate(*amount, description)?;

                if reference.as_deref().is_some_and(|r| self.has_reference(r)) {
                    return Ok(vec![]);
                }

                if self.balance < *amount {
                    return Err(WalletError::InsufficientFunds {
                        balance: self.balance,
                        requested: *amount,
                    });
                }

                Ok(vec![WalletEvent::Debited(WalletDebited {
                    transaction: Self::transaction(TransactionKind::Debit, *amount, description, reference, *at),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.user_id
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
