//! Minor-units conversion at the external API boundary.
//!
//! The accrual engine reports point amounts as a JSON number, floating
//! point in some engine variants. Amounts are converted to integer minor
//! units here, once, and every internal computation stays integral.

use crate::error::{Result, TallyError};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Convert an accrual amount from the engine's floating representation to
/// integer minor units (e.g. `500.0` points -> `50000`). Negative and
/// non-finite values are rejected.
pub fn accrual_to_minor_units(value: f64) -> Result<i64> {
    let decimal = Decimal::from_f64(value)
        .ok_or_else(|| TallyError::Validation(format!("accrual not representable: {value}")))?;

    if decimal < Decimal::ZERO {
        return Err(TallyError::Validation(format!(
            "accrual must be non-negative, got {value}"
        )));
    }

    let minor = (decimal * dec!(100)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    minor
        .to_i64()
        .ok_or_else(|| TallyError::Validation(format!("accrual out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_points() {
        assert_eq!(accrual_to_minor_units(500.0).unwrap(), 50_000);
        assert_eq!(accrual_to_minor_units(0.0).unwrap(), 0);
    }

    #[test]
    fn fractional_points() {
        assert_eq!(accrual_to_minor_units(729.98).unwrap(), 72_998);
        // sub-cent noise from float representation rounds away
        assert_eq!(accrual_to_minor_units(0.1 + 0.2).unwrap(), 30);
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(accrual_to_minor_units(-1.0).is_err());
        assert!(accrual_to_minor_units(f64::NAN).is_err());
        assert!(accrual_to_minor_units(f64::INFINITY).is_err());
    }
}
