//! Line pricing for pizzas and beverages.
//!
//! A pizza's unit price is its base price scaled by the size and crust
//! multipliers, plus the flat price of every topping. Pizzas added to the
//! menu recently carry a percentage discount until the window closes.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::{Beverage, Crust, Pizza, PizzaSize, Topping};
use crate::domain::value_objects::{Money, Quantity};

#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub currency: String,
    pub new_pizza_window: Duration,
    pub new_pizza_discount_percent: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self { currency: "INR".to_string(), new_pizza_window: Duration::days(30), new_pizza_discount_percent: Decimal::TEN }
    }
}

/// A priced line: gross unit price, total discount and net subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinePrice {
    pub unit_price: Money,
    pub discount: Money,
    pub subtotal: Money,
}

/// The options a customer picked for one pizza line.
#[derive(Debug, Clone, Copy)]
pub struct PizzaSelection<'a> {
    pub pizza: &'a Pizza,
    pub size: &'a PizzaSize,
    pub crust: &'a Crust,
    pub toppings: &'a [Topping],
}

impl PricingPolicy {
    pub fn is_new_pizza(&self, pizza: &Pizza, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(pizza.created_at) < self.new_pizza_window
    }

    /// Gross price of one pizza before any discount.
    pub fn pizza_unit_price(&self, selection: &PizzaSelection<'_>) -> Money {
        let scaled = selection.pizza.base_price * selection.size.multiplier * selection.crust.multiplier;
        let toppings: Decimal = selection.toppings.iter().map(|t| t.price).sum();
        Money::new(scaled + toppings, &self.currency)
    }

    pub fn price_pizza(&self, selection: &PizzaSelection<'_>, quantity: Quantity, now: DateTime<Utc>) -> LinePrice {
        let unit = self.pizza_unit_price(selection);
        let unit_discount = if self.is_new_pizza(selection.pizza, now) {
            unit.percent(self.new_pizza_discount_percent)
        } else {
            Money::zero(&self.currency)
        };
        self.line(unit, unit_discount, quantity)
    }

    pub fn price_beverage(&self, beverage: &Beverage, quantity: Quantity) -> LinePrice {
        let unit = Money::new(beverage.price, &self.currency);
        self.line(unit, Money::zero(&self.currency), quantity)
    }

    fn line(&self, unit: Money, unit_discount: Money, quantity: Quantity) -> LinePrice {
        let net = Money::new(unit.amount() - unit_discount.amount(), &self.currency);
        LinePrice {
            discount: unit_discount.multiply(quantity.value()),
            subtotal: net.multiply(quantity.value()),
            unit_price: unit,
        }
    }
}
