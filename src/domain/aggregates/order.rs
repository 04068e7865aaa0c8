//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::{CartItem, CartLine};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery: DeliveryDetails,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<OrderEvent>,
}

/// Snapshot of a cart line at the moment the order was placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub line: CartLine,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub address: String,
    pub phone: String,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether kitchen/delivery staff may move an order from `self` to `next`.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Confirmed, Self::Preparing)
                | (Self::Preparing, Self::OutForDelivery)
                | (Self::OutForDelivery, Self::Delivered)
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

impl OrderItem {
    pub fn from_cart_item(item: &CartItem) -> Self {
        Self {
            id: Uuid::now_v7(),
            line: item.line.clone(),
            title: item.title.clone(),
            quantity: item.quantity.value(),
            unit_price: item.unit_price.amount(),
            discount: item.discount.amount(),
            subtotal: item.subtotal.amount(),
        }
    }
}

impl Order {
    /// Places an order for already priced cart lines.
    pub fn place(order_number: impl Into<String>, customer_id: impl Into<String>, currency: &str, items: &[CartItem], delivery: DeliveryDetails) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let zero = Money::zero(currency);
        let mut subtotal = zero.clone();
        let mut discount = zero.clone();
        let mut total = zero;
        for item in items {
            subtotal = subtotal.add(&item.gross())?;
            discount = discount.add(&item.discount)?;
            total = total.add(&item.subtotal)?;
        }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: order_number.into(), customer_id: customer_id.into(),
            items: items.iter().map(OrderItem::from_cart_item).collect(),
            subtotal, discount, total,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending, delivery,
            gateway_order_id: None, gateway_payment_id: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.id, customer_id: order.customer_id.clone(), total: order.total.amount() });
        Ok(order)
    }

    pub fn currency(&self) -> &str { self.total.currency() }
    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }

    /// Links the order to a freshly created gateway order.
    pub fn attach_gateway_order(&mut self, gateway_order_id: impl Into<String>) -> Result<(), OrderError> {
        if self.is_paid() { return Err(OrderError::AlreadyPaid); }
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Confirmed });
        }
        self.gateway_order_id = Some(gateway_order_id.into());
        self.payment_status = PaymentStatus::Pending;
        self.touch();
        Ok(())
    }

    /// Records a captured payment. A pending order becomes confirmed; a
    /// cancelled order stays cancelled.
    pub fn mark_paid(&mut self, gateway_payment_id: impl Into<String>) {
        let payment_id = gateway_payment_id.into();
        self.payment_status = PaymentStatus::Paid;
        self.gateway_payment_id = Some(payment_id.clone());
        if self.status == OrderStatus::Pending { self.status = OrderStatus::Confirmed; }
        self.touch();
        self.raise_event(OrderEvent::Paid { order_id: self.id, payment_id });
    }

    pub fn mark_payment_failed(&mut self, reason: impl Into<String>) {
        if self.is_paid() { return; }
        self.payment_status = PaymentStatus::Failed;
        self.touch();
        self.raise_event(OrderEvent::PaymentFailed { order_id: self.id, reason: reason.into() });
    }

    pub fn advance(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_advance_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        self.touch();
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, from, to: next });
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_cancellable() {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Cancelled });
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id, was_paid: self.is_paid() });
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Generates a human-facing order number such as `ORD-20261019-04821337`.
pub fn next_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{:08}", now.format("%Y%m%d"), rand::random::<u32>() % 100_000_000)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order is already paid")]
    AlreadyPaid,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::LinePrice;
    use crate::domain::value_objects::Quantity;

    fn order() -> Order {
        let unit = Money::new(Decimal::from(250), "INR");
        let discount = Money::new(Decimal::from(25), "INR");
        let item = CartItem::new(
            CartLine::beverage(Uuid::from_u128(1)),
            "Garlic Bread",
            Quantity::new(2).unwrap(),
            LinePrice { unit_price: unit, discount: discount.multiply(2), subtotal: Money::new(Decimal::from(450), "INR") },
        );
        Order::place("ORD-1", "C1", "INR", &[item], DeliveryDetails::default()).unwrap()
    }

    #[test]
    fn test_place_computes_totals() {
        let mut o = order();
        assert_eq!(o.subtotal.amount(), Decimal::from(500));
        assert_eq!(o.discount.amount(), Decimal::from(50));
        assert_eq!(o.total.amount(), Decimal::from(450));
        assert!(matches!(o.take_events().as_slice(), [OrderEvent::Placed { .. }]));
    }

    #[test]
    fn test_place_requires_items() {
        assert_eq!(Order::place("ORD-1", "C1", "INR", &[], DeliveryDetails::default()).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order();
        assert!(o.advance(OrderStatus::Preparing).is_err());
        o.attach_gateway_order("order_abc").unwrap();
        o.mark_paid("pay_1");
        assert_eq!(o.status, OrderStatus::Confirmed);
        o.advance(OrderStatus::Preparing).unwrap();
        o.advance(OrderStatus::OutForDelivery).unwrap();
        assert!(o.cancel().is_err());
        o.advance(OrderStatus::Delivered).unwrap();
        assert_eq!(o.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_paid_after_cancel_keeps_cancelled() {
        let mut o = order();
        o.cancel().unwrap();
        assert!(o.attach_gateway_order("order_x").is_err());
        o.mark_paid("pay_late");
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_failure_does_not_override_paid() {
        let mut o = order();
        o.mark_paid("pay_1");
        o.mark_payment_failed("late failure");
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert_eq!(o.attach_gateway_order("order_again"), Err(OrderError::AlreadyPaid));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!("out_for_delivery".parse::<OrderStatus>().unwrap(), OrderStatus::OutForDelivery);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}
