//! Application services: validation, pricing and persistence orchestration.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;

use serde::Serialize;

use crate::repository::Page;

pub use cart::{AddBeverage, AddPizza, CartService, CartView};
pub use catalog::{CatalogService, NewBeverage, NewOption, NewPizza, NewTopping};
pub use order::{OrderService, PlaceOrder};
pub use payment::{PaymentService, PaymentSession, VerifyPayment, WebhookOutcome};

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    pub fn new((data, total): (Vec<T>, i64), page: Page) -> Self {
        Self { data, total, page: page.number(), per_page: page.limit() }
    }
}
