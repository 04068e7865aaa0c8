//! HMAC-SHA256 signatures used by the gateway for client callbacks and webhooks.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignatureVerifier {
    key_secret: Secret<String>,
    webhook_secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(key_secret: Secret<String>, webhook_secret: Secret<String>) -> Self {
        Self { key_secret, webhook_secret }
    }

    /// Checks the signature the checkout widget hands back after payment:
    /// hex HMAC of `"{gateway_order_id}|{gateway_payment_id}"` under the key secret.
    pub fn verify_payment(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let payload = format!("{gateway_order_id}|{gateway_payment_id}");
        verify(self.key_secret.expose_secret(), payload.as_bytes(), signature)
    }

    /// Checks a webhook's hex HMAC over the raw request body.
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify(self.webhook_secret.expose_secret(), body, signature)
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("signature check attempted without a configured secret");
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Secret::new("key_secret_123".into()), Secret::new("whsec_456".into()))
    }

    #[test]
    fn test_valid_payment_signature() {
        let sig = sign("key_secret_123", b"order_abc|pay_xyz");
        assert!(verifier().verify_payment("order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn test_swapped_ids_rejected() {
        let sig = sign("key_secret_123", b"order_abc|pay_xyz");
        assert!(!verifier().verify_payment("pay_xyz", "order_abc", &sig));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = sign("other", b"order_abc|pay_xyz");
        assert!(!verifier().verify_payment("order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!(!verifier().verify_payment("order_abc", "pay_xyz", "not-hex"));
    }

    #[test]
    fn test_webhook_signature() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign("whsec_456", body);
        assert!(verifier().verify_webhook(body, &sig));
        assert!(!verifier().verify_webhook(br#"{"event":"payment.failed"}"#, &sig));
    }

    #[test]
    fn test_empty_secret_never_verifies() {
        let v = SignatureVerifier::new(Secret::new(String::new()), Secret::new(String::new()));
        let sig = sign("", b"order|pay");
        assert!(!v.verify_payment("order", "pay", &sig));
    }
}
