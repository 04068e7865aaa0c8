use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::signature::SignatureVerifier;
use crate::config::GatewayConfig;
use crate::{Result, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrderRequest {
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    /// Our order number, echoed back by the gateway.
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the checkout widget is opened with.
    fn key_id(&self) -> &str;
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder>;
    fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool;
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

/// Gateway reached over its REST orders endpoint with basic auth.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: Secret<String>,
    verifier: SignatureVerifier,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Gateway(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            verifier: SignatureVerifier::new(config.key_secret.clone(), config.webhook_secret.clone()),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    #[tracing::instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "gateway rejected order creation");
            return Err(StoreError::Gateway(format!("gateway returned {status}")));
        }

        response.json::<GatewayOrder>().await.map_err(|e| StoreError::Gateway(format!("unreadable gateway response: {e}")))
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        self.verifier.verify_payment(gateway_order_id, gateway_payment_id, signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        self.verifier.verify_webhook(body, signature)
    }
}
