//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 50;

/// Rounds an amount to two decimal places, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount: round_money(amount), currency: currency.to_uppercase() }
    }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// `percent` of this amount, e.g. `percent(10)` is a tenth.
    pub fn percent(&self, percent: Decimal) -> Money {
        Money::new(self.amount * percent / Decimal::ONE_HUNDRED, &self.currency)
    }

    /// Amount in the currency's minor unit (paise, cents).
    pub fn minor_units(&self) -> i64 {
        let minor = (self.amount * Decimal::ONE_HUNDRED).trunc();
        minor.to_i64().unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch")]
    CurrencyMismatch,
}

/// Quantity of a single cart or order line, always in `1..=MAX_LINE_QUANTITY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > MAX_LINE_QUANTITY { return Err(QuantityError::TooLarge(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Result<Self, QuantityError> {
        Self::new(self.0.saturating_add(other.0))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
    #[error("quantity {0} exceeds the per-line limit of {max}", max = MAX_LINE_QUANTITY)]
    TooLarge(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_add() {
        let a = Money::new(Decimal::new(100, 0), "inr");
        let b = Money::new(Decimal::new(50, 0), "INR");
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_money_currency_mismatch() {
        let a = Money::new(Decimal::ONE, "INR");
        let b = Money::new(Decimal::ONE, "USD");
        assert_eq!(a.add(&b), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_money_rounds_half_away_from_zero() {
        assert_eq!(Money::new(Decimal::new(12345, 3), "INR").amount(), Decimal::new(1235, 2));
        assert_eq!(Money::new(Decimal::new(199, 0), "INR").percent(Decimal::TEN).amount(), Decimal::new(1990, 2));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::new(Decimal::new(45050, 2), "INR").minor_units(), 45050);
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert!(Quantity::new(MAX_LINE_QUANTITY).is_ok());
        assert_eq!(Quantity::new(MAX_LINE_QUANTITY + 1), Err(QuantityError::TooLarge(MAX_LINE_QUANTITY + 1)));
        let q = Quantity::new(30).unwrap();
        assert!(q.add(Quantity::new(21).unwrap()).is_err());
    }
}
