//! Checkout and order lifecycle.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{CartService, Paginated};
use crate::domain::aggregates::{next_order_number, DeliveryDetails, Order, OrderStatus};
use crate::events::EventBus;
use crate::repository::{OrderFilter, OrderRepository, Page};
use crate::{Result, StoreError};

/// Attempts at finding a free order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrder {
    #[validate(length(min = 1, max = 64))]
    pub customer_id: String,
    #[validate(length(min = 5, max = 500))]
    pub delivery_address: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    carts: CartService,
    orders: Arc<dyn OrderRepository>,
    events: EventBus,
}

impl OrderService {
    pub fn new(carts: CartService, orders: Arc<dyn OrderRepository>, events: EventBus) -> Self {
        Self { carts, orders, events }
    }

    /// Turns the customer's cart into a pending order. The cart is
    /// re-priced first and must not contain withdrawn items; the order
    /// insert and the cart removal commit together.
    #[instrument(skip(self, req), fields(customer_id = %req.customer_id))]
    pub async fn place_order(&self, req: PlaceOrder) -> Result<Order> {
        req.validate()?;
        let now = Utc::now();
        let mut cart = self.carts.load(&req.customer_id).await?;
        if cart.is_empty() {
            return Err(StoreError::validation("cart is empty"));
        }
        self.carts.reprice(&mut cart, now).await?;

        let unavailable: Vec<&str> = cart.items().iter().filter(|i| !i.available).map(|i| i.title.as_str()).collect();
        if !unavailable.is_empty() {
            return Err(StoreError::conflict(format!("no longer available: {}", unavailable.join(", "))));
        }

        let delivery = DeliveryDetails {
            address: req.delivery_address.trim().to_string(),
            phone: req.phone.trim().to_string(),
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        };

        let mut attempt = 0;
        let mut order = loop {
            attempt += 1;
            let order = Order::place(next_order_number(now), cart.customer_id(), cart.currency(), cart.items(), delivery.clone())?;
            match self.orders.place_order(&order, cart.updated_at()).await {
                Ok(true) => break order,
                Ok(false) => return Err(StoreError::conflict("cart changed during checkout, review it and try again")),
                Err(StoreError::Conflict(msg)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    tracing::warn!(%msg, attempt, "order number collision, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "order placed");
        self.events.publish(order.take_events()).await;
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders.get_order(id).await?.ok_or_else(|| StoreError::not_found(format!("order {id}")))
    }

    pub async fn list_orders(&self, filter: OrderFilter, page: Page) -> Result<Paginated<Order>> {
        Ok(Paginated::new(self.orders.list_orders(&filter, page).await?, page))
    }

    /// Moves an order along the kitchen/delivery workflow. `Cancelled` is
    /// routed to [`OrderService::cancel`].
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel(id).await;
        }
        let mut order = self.get_order(id).await?;
        order.advance(status)?;
        self.persist(order).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.cancel()?;
        if order.is_paid() {
            tracing::warn!(order_id = %id, "paid order cancelled, refund required");
        }
        self.persist(order).await
    }

    async fn persist(&self, mut order: Order) -> Result<Order> {
        let events = order.take_events();
        self.orders.update_order(&order).await?;
        self.events.publish(events).await;
        Ok(order)
    }
}
