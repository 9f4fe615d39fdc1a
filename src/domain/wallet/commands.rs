use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub enum WalletCommand {
    Credit {
        amount: Decimal,
        description: String,
        reference: Option<String>,
        at: DateTime<Utc>,
    },
    Debit {
        amount: Decimal,
        description: String,
        reference: Option<String>,
        at: DateTime<Utc>,
    },
}
