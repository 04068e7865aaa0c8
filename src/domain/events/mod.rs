//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, customer_id: String, total: Decimal },
    Paid { order_id: Uuid, payment_id: String },
    PaymentFailed { order_id: Uuid, reason: String },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid, was_paid: bool },
}

impl OrderEvent {
    /// Suffix of the subject the event is published on.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::Paid { .. } => "paid",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::StatusChanged { .. } => "status_changed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Placed { order_id, .. }
            | Self::Paid { order_id, .. }
            | Self::PaymentFailed { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::Cancelled { order_id, .. } => *order_id,
        }
    }
}
