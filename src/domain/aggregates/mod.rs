//! Aggregates module
pub mod catalog;
pub mod cart;
pub mod order;
pub mod payment;

pub use catalog::{Beverage, CatalogError, Crust, Menu, Pizza, PizzaSize, Topping};
pub use cart::{Cart, CartError, CartItem, CartLine, CartTotals};
pub use order::{next_order_number, DeliveryDetails, Order, OrderError, OrderItem, OrderStatus, PaymentStatus};
pub use payment::{Capture, Payment, PaymentError, PaymentRecordStatus};
