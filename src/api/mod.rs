//! HTTP surface.

mod cart;
mod catalog;
mod error;
mod orders;
mod payments;

pub use payments::SIGNATURE_HEADER;

use axum::{routing::{get, post, put}, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::pricing::PricingPolicy;
use crate::events::EventBus;
use crate::payment::PaymentGateway;
use crate::repository::{CartRepository, CatalogRepository, OrderRepository};
use crate::services::{CartService, CatalogService, OrderService, PaymentService};

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventBus,
        pricing: PricingPolicy,
    ) -> Self {
        let cart_service = CartService::new(catalog.clone(), carts, pricing);
        Self {
            catalog: CatalogService::new(catalog),
            orders: OrderService::new(cart_service.clone(), orders.clone(), events.clone()),
            payments: PaymentService::new(orders, gateway, events),
            carts: cart_service,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "pizza-storefront"})) }))
        .route("/api/v1/menu", get(catalog::menu))
        .route("/api/v1/pizzas", get(catalog::list_pizzas).post(catalog::create_pizza))
        .route("/api/v1/pizzas/:id", get(catalog::get_pizza).put(catalog::update_pizza).delete(catalog::delete_pizza))
        .route("/api/v1/sizes", get(catalog::list_sizes).post(catalog::create_size))
        .route("/api/v1/sizes/:id", get(catalog::get_size).put(catalog::update_size).delete(catalog::delete_size))
        .route("/api/v1/crusts", get(catalog::list_crusts).post(catalog::create_crust))
        .route("/api/v1/crusts/:id", get(catalog::get_crust).put(catalog::update_crust).delete(catalog::delete_crust))
        .route("/api/v1/toppings", get(catalog::list_toppings).post(catalog::create_topping))
        .route("/api/v1/toppings/:id", get(catalog::get_topping).put(catalog::update_topping).delete(catalog::delete_topping))
        .route("/api/v1/beverages", get(catalog::list_beverages).post(catalog::create_beverage))
        .route("/api/v1/beverages/:id", get(catalog::get_beverage).put(catalog::update_beverage).delete(catalog::delete_beverage))
        .route("/api/v1/cart/:customer_id", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/:customer_id/pizzas", post(cart::add_pizza))
        .route("/api/v1/cart/:customer_id/beverages", post(cart::add_beverage))
        .route("/api/v1/cart/:customer_id/items/:item_id", put(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::place_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_status))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/v1/orders/:id/payment", post(payments::initiate))
        .route("/api/v1/payments/verify", post(payments::verify))
        .route("/api/v1/payments/webhook", post(payments::webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
