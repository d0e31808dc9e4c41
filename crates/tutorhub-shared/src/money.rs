//! Money arithmetic.
//!
//! Amounts are `Decimal` everywhere above the database; rows store integer
//! cents so that budget ranges and budget ordering stay in SQL.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_FEE_PERCENT;

/// How an accepted budget is divided between the platform and the tutor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeSplit {
    pub commission: Decimal,
    pub tutor_amount: Decimal,
}

/// The default commission rate as a fraction (0.10).
pub fn default_fee_rate() -> Decimal {
    Decimal::new(DEFAULT_FEE_PERCENT as i64, 2)
}

/// Split `budget` at `fee_rate`, rounding the commission to cents.
///
/// `commission + tutor_amount == budget` always holds.
pub fn split_budget(budget: Decimal, fee_rate: Decimal) -> FeeSplit {
    let commission = round_cents(budget * fee_rate);
    FeeSplit {
        commission,
        tutor_amount: budget - commission,
    }
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert to integer cents.  `None` if the amount does not fit in an `i64`.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    round_cents(amount)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_i64()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Month-over-month growth in percent, rounded to one decimal.
///
/// Undefined (and therefore `None`) when the previous period is zero.
pub fn growth_percent(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    let growth = (current - previous) / previous * Decimal::ONE_HUNDRED;
    Some(growth.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ten_percent_of_one_hundred_thousand() {
        let split = split_budget(dec!(100000), default_fee_rate());
        assert_eq!(split.commission, dec!(10000));
        assert_eq!(split.tutor_amount, dec!(90000));
    }

    #[test]
    fn split_rounds_commission_to_cents() {
        let split = split_budget(dec!(10.05), dec!(0.10));
        assert_eq!(split.commission, dec!(1.01));
        assert_eq!(split.tutor_amount, dec!(9.04));
        assert_eq!(split.commission + split.tutor_amount, dec!(10.05));
    }

    #[test]
    fn cents_conversion() {
        assert_eq!(to_cents(dec!(1234.56)), Some(123456));
        assert_eq!(to_cents(dec!(0.005)), Some(1));
        assert_eq!(from_cents(123456), dec!(1234.56));
    }

    #[test]
    fn growth_against_empty_month_is_undefined() {
        assert_eq!(growth_percent(dec!(500), Decimal::ZERO), None);
        assert_eq!(growth_percent(dec!(150), dec!(100)), Some(dec!(50.0)));
        assert_eq!(growth_percent(dec!(50), dec!(100)), Some(dec!(-50.0)));
    }
}
