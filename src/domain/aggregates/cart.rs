//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::LinePrice;
use crate::domain::value_objects::{Money, MoneyError, Quantity, QuantityError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    customer_id: String,
    items: Vec<CartItem>,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// What a cart line refers to in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartLine {
    Pizza { pizza_id: Uuid, size_id: Uuid, crust_id: Uuid, topping_ids: Vec<Uuid> },
    Beverage { beverage_id: Uuid },
}

impl CartLine {
    /// Pizza line with toppings deduplicated and sorted, so equal
    /// configurations compare equal regardless of selection order.
    pub fn pizza(pizza_id: Uuid, size_id: Uuid, crust_id: Uuid, mut topping_ids: Vec<Uuid>) -> Self {
        topping_ids.sort();
        topping_ids.dedup();
        Self::Pizza { pizza_id, size_id, crust_id, topping_ids }
    }

    pub fn beverage(beverage_id: Uuid) -> Self { Self::Beverage { beverage_id } }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub line: CartLine,
    pub title: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount: Money,
    pub subtotal: Money,
    /// False once the referenced catalog item has been withdrawn.
    pub available: bool,
}

impl CartItem {
    pub fn new(line: CartLine, title: impl Into<String>, quantity: Quantity, price: LinePrice) -> Self {
        Self {
            id: Uuid::now_v7(), line, title: title.into(), quantity,
            unit_price: price.unit_price, discount: price.discount, subtotal: price.subtotal, available: true,
        }
    }

    pub fn apply_price(&mut self, price: LinePrice) {
        self.unit_price = price.unit_price;
        self.discount = price.discount;
        self.subtotal = price.subtotal;
        self.available = true;
    }

    /// Gross line amount before discount.
    pub fn gross(&self) -> Money { self.unit_price.multiply(self.quantity.value()) }
}

/// Totals over the available lines of a cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub item_count: u32,
}

impl Cart {
    pub fn new(customer_id: impl Into<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self { customer_id: customer_id.into(), items: vec![], currency: currency.to_uppercase(), created_at: now, updated_at: now }
    }

    /// Rebuilds a cart from storage.
    pub fn restore(customer_id: String, currency: String, items: Vec<CartItem>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { customer_id, items, currency, created_at, updated_at }
    }

    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn items_mut(&mut self) -> &mut [CartItem] { &mut self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Adds a line, merging it into an existing line with the same configuration.
    /// Returns the id of the line that now holds the quantity.
    pub fn add_item(&mut self, item: CartItem) -> Result<Uuid, CartError> {
        let id = if let Some(existing) = self.items.iter_mut().find(|i| i.line == item.line) {
            let quantity = existing.quantity.add(item.quantity)?;
            existing.quantity = quantity;
            existing.unit_price = item.unit_price;
            existing.available = true;
            let per_unit_discount = item.discount.amount() / rust_decimal::Decimal::from(item.quantity.value());
            existing.discount = Money::new(per_unit_discount, &self.currency).multiply(quantity.value());
            existing.subtotal = existing.gross().subtract(&existing.discount)?;
            existing.id
        } else {
            let id = item.id;
            self.items.push(item);
            id
        };
        self.touch();
        Ok(id)
    }

    pub fn update_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove_item(item_id); }
        let quantity = Quantity::new(quantity)?;
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound(item_id))?;
        let per_unit_discount = item.discount.amount() / rust_decimal::Decimal::from(item.quantity.value());
        item.quantity = quantity;
        item.discount = Money::new(per_unit_discount, &self.currency).multiply(quantity.value());
        item.subtotal = item.gross().subtract(&item.discount)?;
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound(item_id)); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    pub fn totals(&self) -> CartTotals {
        let zero = Money::zero(&self.currency);
        self.items.iter().filter(|i| i.available).fold(
            CartTotals { subtotal: zero.clone(), discount: zero.clone(), total: zero, item_count: 0 },
            |acc, i| CartTotals {
                subtotal: acc.subtotal.add(&i.gross()).unwrap_or(acc.subtotal),
                discount: acc.discount.add(&i.discount).unwrap_or(acc.discount),
                total: acc.total.add(&i.subtotal).unwrap_or(acc.total),
                item_count: acc.item_count + i.quantity.value(),
            },
        )
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item {0} not found")]
    ItemNotFound(Uuid),
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error(transparent)]
    Money(#[from] MoneyError),
}
