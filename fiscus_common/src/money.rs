use std::{fmt::Display, iter::Sum, ops::Mul};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------     MinorUnits       --------------------------------------------------------
/// A signed monetary amount in minor currency units (cents, pence, yen, ...).
///
/// All stored amounts in the ledger are integers of this type. Floating point only ever appears
/// transiently inside [`MinorUnits::convert`] and [`MinorUnits::percent`], and the result is always
/// rounded half-away-from-zero back to an integer. The type says nothing about *which* currency the
/// amount is denominated in; that is carried separately as a [`crate::CurrencyCode`].
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Mul<i64> for MinorUnits {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), std::ops::Add::add)
    }
}

#[derive(Debug, Clone, Error)]
pub enum MoneyConversionError {
    #[error("Cannot convert with non-finite rate {0}")]
    NonFiniteRate(f64),
    #[error("Converting {amount} at rate {rate} does not fit in 64-bit minor units")]
    Overflow { amount: i64, rate: f64 },
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for MinorUnits {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError::Overflow { amount: i64::MAX, rate: 1.0 })
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts the amount with the given exchange rate, rounding half-away-from-zero.
    ///
    /// The multiplication happens in `f64` and is rounded straight back to integer minor units.
    /// Rates must be finite and the result must fit in an `i64`; both conditions are errors rather
    /// than silent truncation.
    pub fn convert(&self, rate: f64) -> Result<MinorUnits, MoneyConversionError> {
        if !rate.is_finite() {
            return Err(MoneyConversionError::NonFiniteRate(rate));
        }
        let converted = (self.0 as f64 * rate).round();
        if converted > i64::MAX as f64 || converted < i64::MIN as f64 {
            return Err(MoneyConversionError::Overflow { amount: self.0, rate });
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(converted as i64))
    }

    /// Takes a percentage of the amount, rounded half-away-from-zero.
    pub fn percent(&self, pct: f64) -> Result<MinorUnits, MoneyConversionError> {
        self.convert(pct / 100.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversion_rounds_half_away_from_zero() {
        let amt = MinorUnits::from(5);
        assert_eq!(amt.convert(0.5).unwrap(), MinorUnits::from(3));
        assert_eq!((-amt).convert(0.5).unwrap(), MinorUnits::from(-3));
        assert_eq!(amt.convert(0.49).unwrap(), MinorUnits::from(2));
        assert_eq!(MinorUnits::from(1000).convert(1.0).unwrap(), MinorUnits::from(1000));
    }

    #[test]
    fn conversion_rejects_bad_rates() {
        let amt = MinorUnits::from(100);
        assert!(matches!(amt.convert(f64::NAN), Err(MoneyConversionError::NonFiniteRate(_))));
        assert!(matches!(amt.convert(f64::INFINITY), Err(MoneyConversionError::NonFiniteRate(_))));
        assert!(matches!(MinorUnits::from(i64::MAX).convert(2.0), Err(MoneyConversionError::Overflow { .. })));
    }

    #[test]
    fn percentages() {
        let amt = MinorUnits::from(1000);
        assert_eq!(amt.percent(10.0).unwrap(), MinorUnits::from(100));
        assert_eq!(amt.percent(0.0).unwrap(), MinorUnits::ZERO);
        // 2.5% of 1010 = 25.25 -> 25
        assert_eq!(MinorUnits::from(1010).percent(2.5).unwrap(), MinorUnits::from(25));
        // half-away-from-zero on the .5 boundary
        assert_eq!(MinorUnits::from(50).percent(15.0).unwrap(), MinorUnits::from(8));
    }

    #[test]
    fn arithmetic() {
        let a = MinorUnits::from(700);
        let b = MinorUnits::from(300);
        assert_eq!(a + b, MinorUnits::from(1000));
        assert_eq!(a - b, MinorUnits::from(400));
        assert_eq!(-a, MinorUnits::from(-700));
        assert_eq!(a * 3, MinorUnits::from(2100));
        let total: MinorUnits = [a, b, -a].into_iter().sum();
        assert_eq!(total, b);
    }
}
