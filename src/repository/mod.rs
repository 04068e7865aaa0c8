//! Storage seams used by the services.
//!
//! Postgres backs the running service; the in-memory store keeps the same
//! atomicity guarantees behind a single lock and is used by tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{Beverage, Cart, Crust, Order, OrderStatus, Payment, Pizza, PizzaSize, Topping};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::{PgCartRepository, PgCatalogRepository, PgOrderRepository};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Page {
    pub fn number(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn limit(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
    /// Row offset; widened so a huge page number cannot overflow.
    pub fn offset(&self) -> i64 { i64::from(self.number() - 1) * i64::from(self.limit()) }
}

#[derive(Debug, Clone, Default)]
pub struct PizzaFilter {
    pub vegetarian: Option<bool>,
    pub search: Option<String>,
    pub include_unavailable: bool,
}

impl PizzaFilter {
    pub fn matches(&self, pizza: &Pizza) -> bool {
        (self.include_unavailable || pizza.is_available)
            && self.vegetarian.map_or(true, |v| pizza.is_vegetarian == v)
            && self.search.as_deref().map_or(true, |s| pizza.name.to_lowercase().contains(&s.to_lowercase()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.customer_id.as_deref().map_or(true, |c| order.customer_id == c)
            && self.status.map_or(true, |s| order.status == s)
    }
}

/// Menu items. Saving is an upsert; items are never physically removed.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_pizzas(&self, filter: &PizzaFilter, page: Page) -> Result<(Vec<Pizza>, i64)>;
    /// Every pizza on the menu, unpaginated, newest first.
    async fn list_available_pizzas(&self) -> Result<Vec<Pizza>>;
    async fn get_pizza(&self, id: Uuid) -> Result<Option<Pizza>>;
    async fn save_pizza(&self, pizza: &Pizza) -> Result<()>;

    async fn list_sizes(&self, include_unavailable: bool) -> Result<Vec<PizzaSize>>;
    async fn get_size(&self, id: Uuid) -> Result<Option<PizzaSize>>;
    async fn save_size(&self, size: &PizzaSize) -> Result<()>;

    async fn list_crusts(&self, include_unavailable: bool) -> Result<Vec<Crust>>;
    async fn get_crust(&self, id: Uuid) -> Result<Option<Crust>>;
    async fn save_crust(&self, crust: &Crust) -> Result<()>;

    async fn list_toppings(&self, include_unavailable: bool) -> Result<Vec<Topping>>;
    async fn get_toppings(&self, ids: &[Uuid]) -> Result<Vec<Topping>>;
    async fn save_topping(&self, topping: &Topping) -> Result<()>;

    async fn list_beverages(&self, include_unavailable: bool) -> Result<Vec<Beverage>>;
    async fn get_beverage(&self, id: Uuid) -> Result<Option<Beverage>>;
    async fn save_beverage(&self, beverage: &Beverage) -> Result<()>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, customer_id: &str) -> Result<Option<Cart>>;
    /// Replaces the stored cart, lines included.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
    async fn delete_cart(&self, customer_id: &str) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order with its items and deletes the customer's cart,
    /// atomically, provided the cart still carries `cart_updated_at`.
    /// Returns false and writes nothing when the cart changed or is gone.
    async fn place_order(&self, order: &Order, cart_updated_at: DateTime<Utc>) -> Result<bool>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, i64)>;
    async fn update_order(&self, order: &Order) -> Result<()>;

    async fn find_payment(&self, gateway_order_id: &str) -> Result<Option<Payment>>;
    /// Persists the order's payment fields together with the payment record.
    async fn save_payment(&self, order: &Order, payment: &Payment) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        let p = Page { page: Some(0), per_page: Some(500) };
        assert_eq!(p.number(), 1);
        assert_eq!(p.limit(), MAX_PER_PAGE);
        assert_eq!(Page { page: Some(3), per_page: None }.offset(), 40);
    }

    #[test]
    fn test_offset_of_huge_page_does_not_overflow() {
        let p = Page { page: Some(300_000_000), per_page: Some(20) };
        assert_eq!(p.offset(), 5_999_999_980);
        assert_eq!(Page { page: Some(u32::MAX), per_page: Some(MAX_PER_PAGE) }.offset(), (i64::from(u32::MAX) - 1) * 100);
    }
}
