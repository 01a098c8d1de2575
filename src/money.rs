//! Amounts are `Decimal`s with at most two fractional digits. Anything finer
//! is refused where it enters the system, so every later check compares the
//! exact amount it then moves.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::Error;

pub const CENT_SCALE: u32 = 2;

/// Validates an amount arriving from a caller: positive and a whole number of
/// cents. The result carries scale 2.
pub fn checked_amount(amount: Decimal, what: &str) -> Result<Decimal, Error> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid_input_error(format!("{} must be positive", what)));
    }

    if amount.normalize().scale() > CENT_SCALE {
        return Err(Error::invalid_input_error(format!(
            "{} cannot have fractions of a cent",
            what
        )));
    }

    let mut amount = amount;
    amount.rescale(CENT_SCALE);

    Ok(amount)
}

/// Splits a settled amount into the driver's payout and the platform fee. The
/// fee is rounded half away from zero; the payout is the exact remainder.
pub fn split_fee(amount: Decimal, fee_rate: Decimal) -> (Decimal, Decimal) {
    let platform_fee =
        (amount * fee_rate).round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    (amount - platform_fee, platform_fee)
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn split_fee_test() {
    assert_eq!(split_fee(dec!(100), dec!(0.02)), (dec!(98), dec!(2)));
    assert_eq!(split_fee(dec!(50.00), dec!(0.02)), (dec!(49.00), dec!(1.00)));

    let (driver_amount, platform_fee) = split_fee(dec!(123.45), dec!(0.02));
    assert_eq!(platform_fee, dec!(2.47));
    assert_eq!(driver_amount, dec!(120.98));
    assert_eq!(driver_amount + platform_fee, dec!(123.45));

    // 0.25 × 0.02 = 0.005 rounds up, and the parts still add up
    assert_eq!(split_fee(dec!(0.25), dec!(0.02)), (dec!(0.24), dec!(0.01)));
    assert_eq!(split_fee(dec!(10), Decimal::ZERO), (dec!(10), dec!(0)));
}

#[test]
fn checked_amount_test() {
    assert_eq!(checked_amount(dec!(0.01), "price").unwrap(), dec!(0.01));
    assert_eq!(checked_amount(dec!(10.0000), "price").unwrap(), dec!(10));
    assert_eq!(checked_amount(dec!(7), "price").unwrap().scale(), 2);

    for amount in [dec!(0), dec!(-5), dec!(10.004), dec!(10.006), dec!(0.001)] {
        let err = checked_amount(amount, "price").unwrap_err();
        assert!(err.is_invalid_input_error(), "{}", amount);
    }
}
