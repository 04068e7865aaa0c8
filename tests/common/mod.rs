use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use axum::{body::Body, http::{Method, Request, StatusCode}, Router};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use pizza_storefront::api::{self, AppState};
use pizza_storefront::domain::pricing::PricingPolicy;
use pizza_storefront::events::EventBus;
use pizza_storefront::payment::signature::SignatureVerifier;
use pizza_storefront::payment::{GatewayOrder, GatewayOrderRequest, PaymentGateway};
use pizza_storefront::repository::MemoryStore;

pub const KEY_SECRET: &str = "it_key_secret";
pub const WEBHOOK_SECRET: &str = "it_webhook_secret";

pub struct StubGateway {
    created: AtomicU32,
    verifier: SignatureVerifier,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str { "rzp_test_it" }

    async fn create_order(&self, request: GatewayOrderRequest) -> pizza_storefront::Result<GatewayOrder> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder { id: format!("order_it{n}"), amount: request.amount, currency: request.currency })
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        self.verifier.verify_payment(order_id, payment_id, signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        self.verifier.verify_webhook(body, signature)
    }
}

pub fn app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(StubGateway {
        created: AtomicU32::new(0),
        verifier: SignatureVerifier::new(Secret::new(KEY_SECRET.into()), Secret::new(WEBHOOK_SECRET.into())),
    });
    let state = AppState::new(store.clone(), store.clone(), store, gateway, EventBus::default(), PricingPolicy::default());
    api::router(state)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    call(app, builder.body(body).unwrap()).await
}

pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

/// Hex HMAC-SHA256, the way the gateway signs callbacks and webhooks.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Decimals travel as JSON strings.
pub fn decimal(value: &Value) -> Decimal {
    value.as_str().expect("decimal string").parse().unwrap()
}
