//! Payment gateway contract and its HTTP implementation.

pub mod gateway;
pub mod signature;

pub use gateway::{GatewayOrder, GatewayOrderRequest, HttpPaymentGateway, PaymentGateway};
pub use signature::SignatureVerifier;
