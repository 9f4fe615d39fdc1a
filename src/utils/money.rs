//! Money helpers on top of `rust_decimal`.
//!
//! Amounts are kept as exact decimals and only rounded where a division or a
//! percentage produces more than two fractional digits.

use rust_decimal::prelude::*;

/// Currency precision (paise / cents)
pub const DECIMAL_PLACES: u32 = 2;

/// Round to currency precision, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × percent / 100`, rounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// Line total for a captured unit price.
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}
