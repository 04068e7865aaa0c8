//! Payment attempts against the gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentRecordStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    #[default]
    Created,
    Captured,
    Failed,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Captured => "captured",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "captured" => Ok(Self::Captured),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment record status '{other}'")),
        }
    }
}

/// Outcome of applying a capture to a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    Applied,
    /// The same gateway payment was already recorded.
    Duplicate,
}

impl Payment {
    pub fn create(order_id: Uuid, gateway_order_id: impl Into<String>, amount: Decimal, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), order_id, gateway_order_id: gateway_order_id.into(), gateway_payment_id: None,
            amount, currency: currency.to_string(), status: PaymentRecordStatus::Created, failure_reason: None,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_captured(&self) -> bool { self.status == PaymentRecordStatus::Captured }

    pub fn capture(&mut self, gateway_payment_id: &str) -> Result<Capture, PaymentError> {
        if self.is_captured() {
            return match self.gateway_payment_id.as_deref() {
                Some(id) if id == gateway_payment_id => Ok(Capture::Duplicate),
                _ => Err(PaymentError::AlreadyCaptured(self.gateway_order_id.clone())),
            };
        }
        self.status = PaymentRecordStatus::Captured;
        self.gateway_payment_id = Some(gateway_payment_id.to_string());
        self.failure_reason = None;
        self.updated_at = Utc::now();
        Ok(Capture::Applied)
    }

    /// Marks the attempt failed. Returns false when it was already captured.
    pub fn fail(&mut self, gateway_payment_id: Option<&str>, reason: impl Into<String>) -> bool {
        if self.is_captured() { return false; }
        self.status = PaymentRecordStatus::Failed;
        if let Some(id) = gateway_payment_id { self.gateway_payment_id = Some(id.to_string()); }
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("gateway order {0} was already captured by another payment")]
    AlreadyCaptured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_idempotent_for_same_payment() {
        let mut p = Payment::create(Uuid::now_v7(), "order_1", Decimal::from(450), "INR");
        assert_eq!(p.capture("pay_1"), Ok(Capture::Applied));
        assert_eq!(p.capture("pay_1"), Ok(Capture::Duplicate));
        assert_eq!(p.capture("pay_2"), Err(PaymentError::AlreadyCaptured("order_1".into())));
    }

    #[test]
    fn test_failure_after_capture_is_ignored() {
        let mut p = Payment::create(Uuid::now_v7(), "order_1", Decimal::from(450), "INR");
        assert!(p.fail(Some("pay_0"), "card declined"));
        assert_eq!(p.status, PaymentRecordStatus::Failed);
        p.capture("pay_1").unwrap();
        assert!(!p.fail(None, "late"));
        assert_eq!(p.status, PaymentRecordStatus::Captured);
        assert_eq!(p.failure_reason, None);
    }
}
