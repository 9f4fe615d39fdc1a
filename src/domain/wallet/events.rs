use serde::{Deserialize, Serialize};

use crate::event_sourcing::DomainEvent;
use super::value_objects::WalletTransaction;

// ============================================================================
// Wallet Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    Credited(WalletCredited),
    Debited(WalletDebited),
}

impl DomainEvent for WalletEvent {
    fn event_name(&self) -> &'static str {
        match self {
            WalletEvent::Credited(_) => "WalletCredited",
            WalletEvent::Debited(_) => "WalletDebited",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WalletCredited {
    pub transaction: WalletTransaction,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WalletDebited {
    pub transaction: WalletTransaction,
}
