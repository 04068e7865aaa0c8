//! In-memory store implementing every repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{CartRepository, CatalogRepository, OrderFilter, OrderRepository, Page, PizzaFilter};
use crate::domain::aggregates::{Beverage, Cart, Crust, Order, Payment, Pizza, PizzaSize, Topping};
use crate::{Result, StoreError};

#[derive(Default)]
struct State {
    pizzas: HashMap<Uuid, Pizza>,
    sizes: HashMap<Uuid, PizzaSize>,
    crusts: HashMap<Uuid, Crust>,
    toppings: HashMap<Uuid, Topping>,
    beverages: HashMap<Uuid, Beverage>,
    carts: HashMap<String, Cart>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<String, Payment>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self.state.lock().map_err(|_| StoreError::Storage("memory store lock poisoned".into()))?;
        Ok(f(&mut state))
    }
}

fn sorted_by_name<T: Clone>(items: &HashMap<Uuid, T>, keep: impl Fn(&T) -> bool, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut out: Vec<T> = items.values().filter(|i| keep(i)).cloned().collect();
    out.sort_by(|a, b| name(a).cmp(name(b)));
    out
}

fn paginate<T>(items: Vec<T>, page: Page) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let data = items.into_iter().skip(skip).take(page.limit() as usize).collect();
    (data, total)
}

fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.events.clear();
    copy
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn list_pizzas(&self, filter: &PizzaFilter, page: Page) -> Result<(Vec<Pizza>, i64)> {
        self.with(|s| {
            let mut pizzas: Vec<Pizza> = s.pizzas.values().filter(|p| filter.matches(p)).cloned().collect();
            pizzas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            paginate(pizzas, page)
        })
    }

    async fn list_available_pizzas(&self) -> Result<Vec<Pizza>> {
        self.with(|s| {
            let mut pizzas: Vec<Pizza> = s.pizzas.values().filter(|p| p.is_available).cloned().collect();
            pizzas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            pizzas
        })
    }

    async fn get_pizza(&self, id: Uuid) -> Result<Option<Pizza>> {
        self.with(|s| s.pizzas.get(&id).cloned())
    }

    async fn save_pizza(&self, pizza: &Pizza) -> Result<()> {
        self.with(|s| { s.pizzas.insert(pizza.id, pizza.clone()); })
    }

    async fn list_sizes(&self, include_unavailable: bool) -> Result<Vec<PizzaSize>> {
        self.with(|s| {
            let mut sizes = sorted_by_name(&s.sizes, |i| include_unavailable || i.is_available, |i| i.name.as_str());
            sizes.sort_by(|a, b| a.multiplier.cmp(&b.multiplier));
            sizes
        })
    }

    async fn get_size(&self, id: Uuid) -> Result<Option<PizzaSize>> {
        self.with(|s| s.sizes.get(&id).cloned())
    }

    async fn save_size(&self, size: &PizzaSize) -> Result<()> {
        self.with(|s| { s.sizes.insert(size.id, size.clone()); })
    }

    async fn list_crusts(&self, include_unavailable: bool) -> Result<Vec<Crust>> {
        self.with(|s| sorted_by_name(&s.crusts, |i| include_unavailable || i.is_available, |i| i.name.as_str()))
    }

    async fn get_crust(&self, id: Uuid) -> Result<Option<Crust>> {
        self.with(|s| s.crusts.get(&id).cloned())
    }

    async fn save_crust(&self, crust: &Crust) -> Result<()> {
        self.with(|s| { s.crusts.insert(crust.id, crust.clone()); })
    }

    async fn list_toppings(&self, include_unavailable: bool) -> Result<Vec<Topping>> {
        self.with(|s| sorted_by_name(&s.toppings, |i| include_unavailable || i.is_available, |i| i.name.as_str()))
    }

    async fn get_toppings(&self, ids: &[Uuid]) -> Result<Vec<Topping>> {
        self.with(|s| ids.iter().filter_map(|id| s.toppings.get(id).cloned()).collect())
    }

    async fn save_topping(&self, topping: &Topping) -> Result<()> {
        self.with(|s| { s.toppings.insert(topping.id, topping.clone()); })
    }

    async fn list_beverages(&self, include_unavailable: bool) -> Result<Vec<Beverage>> {
        self.with(|s| sorted_by_name(&s.beverages, |i| include_unavailable || i.is_available, |i| i.name.as_str()))
    }

    async fn get_beverage(&self, id: Uuid) -> Result<Option<Beverage>> {
        self.with(|s| s.beverages.get(&id).cloned())
    }

    async fn save_beverage(&self, beverage: &Beverage) -> Result<()> {
        self.with(|s| { s.beverages.insert(beverage.id, beverage.clone()); })
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn get_cart(&self, customer_id: &str) -> Result<Option<Cart>> {
        self.with(|s| s.carts.get(customer_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.with(|s| { s.carts.insert(cart.customer_id().to_string(), cart.clone()); })
    }

    async fn delete_cart(&self, customer_id: &str) -> Result<()> {
        self.with(|s| { s.carts.remove(customer_id); })
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn place_order(&self, order: &Order, cart_updated_at: DateTime<Utc>) -> Result<bool> {
        self.with(|s| {
            if s.carts.get(&order.customer_id).map(Cart::updated_at) != Some(cart_updated_at) {
                return Ok(false);
            }
            if s.orders.values().any(|o| o.order_number == order.order_number) {
                return Err(StoreError::conflict(format!("order number {} already exists", order.order_number)));
            }
            s.orders.insert(order.id, stored(order));
            s.carts.remove(&order.customer_id);
            Ok(true)
        })?
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.with(|s| s.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, i64)> {
        self.with(|s| {
            let mut orders: Vec<Order> = s.orders.values().filter(|o| filter.matches(o)).cloned().collect();
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            paginate(orders, page)
        })
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.with(|s| match s.orders.get_mut(&order.id) {
            Some(existing) => { *existing = stored(order); Ok(()) }
            None => Err(StoreError::not_found(format!("order {}", order.id))),
        })?
    }

    async fn find_payment(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        self.with(|s| s.payments.get(gateway_order_id).cloned())
    }

    async fn save_payment(&self, order: &Order, payment: &Payment) -> Result<()> {
        self.with(|s| {
            if let Some(existing) = s.payments.get(&payment.gateway_order_id) {
                let same_capture = payment.is_captured() && existing.gateway_payment_id == payment.gateway_payment_id;
                if existing.is_captured() && !same_capture {
                    return Err(StoreError::conflict(format!(
                        "gateway order {} was already captured by another payment",
                        payment.gateway_order_id
                    )));
                }
            }
            if !s.orders.contains_key(&order.id) {
                return Err(StoreError::not_found(format!("order {}", order.id)));
            }
            s.orders.insert(order.id, stored(order));
            s.payments.insert(payment.gateway_order_id.clone(), payment.clone());
            Ok(())
        })?
    }
}
