use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or(0)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Parse an amount string like `13.94` or `1,234.56` (optional leading
    /// `-` and currency symbol already stripped by the caller's regex).
    pub fn parse_str(s: &str) -> Option<Self> {
        let clean = s.replace(',', "");
        Decimal::from_str(&clean).ok().map(Money::from_decimal)
    }

    /// Multiply by a quantity (e.g. unit price × quantity).
    pub fn mul_decimal(self, factor: Decimal) -> Self {
        Money((self.0 * factor).round_dp(2))
    }

    /// Divide by a quantity; `None` when the divisor is zero.
    pub fn div_decimal(self, divisor: Decimal) -> Option<Self> {
        if divisor.is_zero() {
            None
        } else {
            Some(Money((self.0 / divisor).round_dp(2)))
        }
    }

    /// `self / other` as a plain ratio (e.g. tax ÷ subtotal for a tax rate).
    pub fn ratio(self, other: Money) -> Option<Decimal> {
        if other.0.is_zero() {
            None
        } else {
            Some(self.0 / other.0)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}
