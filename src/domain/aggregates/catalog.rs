//! Menu catalog: pizzas and the options they are ordered with.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pizza {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub image_url: Option<String>,
    pub is_vegetarian: bool,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Size option; scales the pizza's base price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PizzaSize {
    pub id: Uuid,
    pub name: String,
    pub multiplier: Decimal,
    pub is_available: bool,
}

/// Crust option; scales the pizza's base price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Crust {
    pub id: Uuid,
    pub name: String,
    pub multiplier: Decimal,
    pub is_available: bool,
}

/// Topping add-on, charged at a flat price per pizza.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topping {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_vegetarian: bool,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Beverage {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub volume_ml: Option<i32>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything currently orderable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Menu {
    pub pizzas: Vec<Pizza>,
    pub sizes: Vec<PizzaSize>,
    pub crusts: Vec<Crust>,
    pub toppings: Vec<Topping>,
    pub beverages: Vec<Beverage>,
}

impl Pizza {
    pub fn create(name: impl Into<String>, description: Option<String>, base_price: Decimal, is_vegetarian: bool) -> Result<Self, CatalogError> {
        let now = Utc::now();
        let pizza = Self {
            id: Uuid::now_v7(), name: name.into().trim().to_string(), description, base_price,
            image_url: None, is_vegetarian, is_available: true, created_at: now, updated_at: now,
        };
        pizza.validate()?;
        Ok(pizza)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        ensure_name(&self.name)?;
        ensure_price(self.base_price)
    }

    pub fn withdraw(&mut self) { self.is_available = false; self.touch(); }
    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl PizzaSize {
    pub fn create(name: impl Into<String>, multiplier: Decimal) -> Result<Self, CatalogError> {
        let size = Self { id: Uuid::now_v7(), name: name.into().trim().to_string(), multiplier, is_available: true };
        size.validate()?;
        Ok(size)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        ensure_name(&self.name)?;
        ensure_multiplier(self.multiplier)
    }
}

impl Crust {
    pub fn create(name: impl Into<String>, multiplier: Decimal) -> Result<Self, CatalogError> {
        let crust = Self { id: Uuid::now_v7(), name: name.into().trim().to_string(), multiplier, is_available: true };
        crust.validate()?;
        Ok(crust)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        ensure_name(&self.name)?;
        ensure_multiplier(self.multiplier)
    }
}

impl Topping {
    pub fn create(name: impl Into<String>, price: Decimal, is_vegetarian: bool) -> Result<Self, CatalogError> {
        let topping = Self { id: Uuid::now_v7(), name: name.into().trim().to_string(), price, is_vegetarian, is_available: true };
        topping.validate()?;
        Ok(topping)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        ensure_name(&self.name)?;
        ensure_price(self.price)
    }
}

impl Beverage {
    pub fn create(name: impl Into<String>, description: Option<String>, price: Decimal, volume_ml: Option<i32>) -> Result<Self, CatalogError> {
        let beverage = Self {
            id: Uuid::now_v7(), name: name.into().trim().to_string(), description, price, volume_ml,
            is_available: true, created_at: Utc::now(),
        };
        beverage.validate()?;
        Ok(beverage)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        ensure_name(&self.name)?;
        ensure_price(self.price)?;
        match self.volume_ml {
            Some(v) if v <= 0 => Err(CatalogError::InvalidVolume(v)),
            _ => Ok(()),
        }
    }
}

fn ensure_name(name: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() { return Err(CatalogError::MissingName); }
    Ok(())
}

/// Largest menu price, 99999999.99; matches the `NUMERIC(10, 2)` price columns.
pub const MAX_PRICE: Decimal = Decimal::from_parts(0x540B_E3FF, 0x2, 0, false, 2);
/// Largest size or crust multiplier; matches `NUMERIC(6, 3)`.
pub const MAX_MULTIPLIER: Decimal = Decimal::from_parts(999_999, 0, 0, false, 3);

fn ensure_price(price: Decimal) -> Result<(), CatalogError> {
    if price.is_sign_negative() && !price.is_zero() { return Err(CatalogError::NegativePrice(price)); }
    if price > MAX_PRICE { return Err(CatalogError::PriceTooHigh(price)); }
    Ok(())
}

fn ensure_multiplier(multiplier: Decimal) -> Result<(), CatalogError> {
    if multiplier <= Decimal::ZERO || multiplier > MAX_MULTIPLIER {
        return Err(CatalogError::InvalidMultiplier(multiplier));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("name must not be empty")]
    MissingName,
    #[error("price {0} must not be negative")]
    NegativePrice(Decimal),
    #[error("price {0} exceeds the maximum of {MAX_PRICE}")]
    PriceTooHigh(Decimal),
    #[error("multiplier {0} must be greater than zero and at most {MAX_MULTIPLIER}")]
    InvalidMultiplier(Decimal),
    #[error("volume {0} ml must be positive")]
    InvalidVolume(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pizza_create() {
        let p = Pizza::create("  Margherita ", None, Decimal::new(19900, 2), true).unwrap();
        assert_eq!(p.name, "Margherita");
        assert!(p.is_available);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(Pizza::create(" ", None, Decimal::ONE, true), Err(CatalogError::MissingName));
        assert!(matches!(Topping::create("Olives", Decimal::new(-1, 0), true), Err(CatalogError::NegativePrice(_))));
        assert!(matches!(PizzaSize::create("Tiny", Decimal::ZERO), Err(CatalogError::InvalidMultiplier(_))));
        assert!(matches!(Beverage::create("Cola", None, Decimal::ONE, Some(0)), Err(CatalogError::InvalidVolume(0))));
    }

    #[test]
    fn test_upper_bounds() {
        assert!(Pizza::create("Gold Leaf", None, MAX_PRICE, true).is_ok());
        assert!(matches!(Pizza::create("Gold Leaf", None, MAX_PRICE + Decimal::new(1, 2), true), Err(CatalogError::PriceTooHigh(_))));
        assert!(PizzaSize::create("Party", MAX_MULTIPLIER).is_ok());
        assert!(matches!(Crust::create("Stuffed", Decimal::from(1000)), Err(CatalogError::InvalidMultiplier(_))));
        assert_eq!(MAX_PRICE.to_string(), "99999999.99");
        assert_eq!(MAX_MULTIPLIER.to_string(), "999.999");
    }

    #[test]
    fn test_withdraw() {
        let mut p = Pizza::create("Farmhouse", None, Decimal::new(250, 0), true).unwrap();
        p.withdraw();
        assert!(!p.is_available);
    }
}
