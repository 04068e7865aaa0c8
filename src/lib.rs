//! Pizza Storefront
//!
//! Backend for a pizza ordering storefront.
//!
//! ## Features
//! - Menu catalog: pizzas, sizes, crusts, toppings, beverages
//! - Per-customer carts with size/crust/topping pricing
//! - Time-bounded discount on newly added pizzas
//! - Cart to order conversion in a single transaction
//! - Payment gateway verification and webhook reconciliation

pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod payment;
pub mod repository;
pub mod services;

use thiserror::Error;

use crate::domain::aggregates::{CartError, CatalogError, OrderError, PaymentError};
use crate::domain::value_objects::{MoneyError, QuantityError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::PaymentVerification(_) => "payment_verification",
            Self::InvalidSignature => "invalid_signature",
            Self::Gateway(_) => "gateway",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<QuantityError> for StoreError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<MoneyError> for StoreError {
    fn from(err: MoneyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CatalogError> for StoreError {
    fn from(err: CatalogError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CartError> for StoreError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound(id) => Self::NotFound(format!("cart item {id}")),
            CartError::Quantity(e) => e.into(),
            CartError::Money(e) => e.into(),
        }
    }
}

impl From<OrderError> for StoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => Self::Validation(err.to_string()),
            OrderError::Money(e) => e.into(),
            OrderError::InvalidTransition { .. } | OrderError::AlreadyPaid => {
                Self::InvalidTransition(err.to_string())
            }
        }
    }
}

impl From<PaymentError> for StoreError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::AlreadyCaptured(_) => Self::Conflict(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
