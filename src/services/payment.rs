//! Payment initiation and reconciliation of gateway callbacks.
//!
//! Both the checkout widget's client callback and the gateway's webhook
//! funnel into the same capture path, so whichever arrives first settles
//! the order and the other is recognised as a duplicate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Capture, Order, OrderError, OrderStatus, Payment, PaymentRecordStatus, PaymentStatus};
use crate::events::EventBus;
use crate::payment::{GatewayOrderRequest, PaymentGateway};
use crate::repository::OrderRepository;
use crate::{Result, StoreError};

/// What the client needs to open the gateway's checkout widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSession {
    pub order_id: Uuid,
    pub order_number: String,
    pub gateway_order_id: String,
    pub key_id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPayment {
    #[validate(length(min = 1, max = 64))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Captured { order_id: Uuid },
    Failed { order_id: Uuid },
    Duplicate { order_id: Uuid },
    Ignored,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookEntity>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventBus,
}

impl PaymentService {
    pub fn new(orders: Arc<dyn OrderRepository>, gateway: Arc<dyn PaymentGateway>, events: EventBus) -> Self {
        Self { orders, gateway, events }
    }

    /// Opens a gateway order for the order's total. An attempt that is
    /// still open is handed back instead of creating another.
    #[instrument(skip(self))]
    pub async fn initiate(&self, order_id: Uuid) -> Result<PaymentSession> {
        let mut order = self.order(order_id).await?;
        if order.is_paid() {
            return Err(OrderError::AlreadyPaid.into());
        }
        if order.status == OrderStatus::Cancelled {
            return Err(StoreError::InvalidTransition(format!("order {order_id} is cancelled")));
        }

        if let Some(open) = self.open_attempt(&order).await? {
            tracing::debug!(gateway_order_id = %open.gateway_order_id, "reusing open payment attempt");
            return Ok(self.session(&order, &open));
        }

        let request = GatewayOrderRequest {
            amount: order.total.minor_units(),
            currency: order.currency().to_string(),
            receipt: order.order_number.clone(),
        };
        let gateway_order = self.gateway.create_order(request.clone()).await?;
        if gateway_order.amount != request.amount {
            return Err(StoreError::Gateway(format!(
                "gateway order {} has amount {}, expected {}",
                gateway_order.id, gateway_order.amount, request.amount
            )));
        }

        order.attach_gateway_order(gateway_order.id.clone())?;
        let payment = Payment::create(order.id, gateway_order.id, order.total.amount(), order.currency());
        self.orders.save_payment(&order, &payment).await?;
        tracing::info!(order_id = %order.id, gateway_order_id = %payment.gateway_order_id, "payment initiated");
        Ok(self.session(&order, &payment))
    }

    /// Client-side confirmation after the customer completes checkout.
    #[instrument(skip(self, req), fields(gateway_order_id = %req.gateway_order_id))]
    pub async fn verify(&self, req: VerifyPayment) -> Result<Order> {
        req.validate()?;
        let mut payment = self.payment(&req.gateway_order_id).await?;

        if !self.gateway.verify_payment_signature(&req.gateway_order_id, &req.gateway_payment_id, &req.signature) {
            tracing::warn!(gateway_payment_id = %req.gateway_payment_id, "payment signature mismatch");
            self.fail(&mut payment, Some(req.gateway_payment_id.as_str()), "signature verification failed").await?;
            return Err(StoreError::PaymentVerification("signature mismatch".into()));
        }

        self.capture(payment, &req.gateway_payment_id).await.map(|(order, _)| order)
    }

    /// Server-to-server notification. The signature covers the raw body.
    #[instrument(skip_all)]
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let signature = signature.ok_or(StoreError::InvalidSignature)?;
        if !self.gateway.verify_webhook_signature(body, signature) {
            return Err(StoreError::InvalidSignature);
        }

        let envelope: WebhookEnvelope =
            serde_json::from_slice(body).map_err(|e| StoreError::validation(format!("malformed webhook: {e}")))?;
        let entity = match (envelope.event.as_str(), envelope.payload.payment) {
            ("payment.captured" | "payment.failed", Some(p)) => p.entity,
            (event, _) => {
                tracing::debug!(event, "ignoring webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let Some(mut payment) = self.orders.find_payment(&entity.order_id).await? else {
            tracing::warn!(gateway_order_id = %entity.order_id, "webhook for unknown gateway order");
            return Ok(WebhookOutcome::Ignored);
        };
        let order_id = payment.order_id;

        if envelope.event == "payment.captured" {
            let (_, capture) = self.capture(payment, &entity.id).await?;
            return Ok(match capture {
                Capture::Applied => WebhookOutcome::Captured { order_id },
                Capture::Duplicate => WebhookOutcome::Duplicate { order_id },
            });
        }

        let reason = entity.error_description.unwrap_or_else(|| "payment failed".into());
        if self.fail(&mut payment, Some(entity.id.as_str()), &reason).await? {
            Ok(WebhookOutcome::Failed { order_id })
        } else {
            Ok(WebhookOutcome::Ignored)
        }
    }

    async fn capture(&self, mut payment: Payment, gateway_payment_id: &str) -> Result<(Order, Capture)> {
        let mut order = self.order(payment.order_id).await?;
        let capture = payment.capture(gateway_payment_id)?;
        if capture == Capture::Duplicate {
            return Ok((order, capture));
        }

        if order.is_paid() {
            tracing::warn!(order_id = %order.id, gateway_payment_id, "second payment captured for a paid order, refund required");
        } else {
            order.mark_paid(gateway_payment_id);
            if order.status == OrderStatus::Cancelled {
                tracing::warn!(order_id = %order.id, gateway_payment_id, "payment captured for a cancelled order, refund required");
            }
        }

        let events = order.take_events();
        self.orders.save_payment(&order, &payment).await?;
        self.events.publish(events).await;
        tracing::info!(order_id = %order.id, gateway_payment_id, "payment captured");
        Ok((order, capture))
    }

    /// Returns false when the payment had already been captured.
    async fn fail(&self, payment: &mut Payment, gateway_payment_id: Option<&str>, reason: &str) -> Result<bool> {
        if !payment.fail(gateway_payment_id, reason) {
            return Ok(false);
        }
        let mut order = self.order(payment.order_id).await?;
        if order.gateway_order_id.as_deref() == Some(payment.gateway_order_id.as_str()) {
            order.mark_payment_failed(reason);
        }
        let events = order.take_events();
        self.orders.save_payment(&order, payment).await?;
        self.events.publish(events).await;
        Ok(true)
    }

    async fn open_attempt(&self, order: &Order) -> Result<Option<Payment>> {
        let Some(gateway_order_id) = order.gateway_order_id.as_deref() else { return Ok(None) };
        if order.payment_status != PaymentStatus::Pending {
            return Ok(None);
        }
        Ok(self
            .orders
            .find_payment(gateway_order_id)
            .await?
            .filter(|p| p.status == PaymentRecordStatus::Created && p.amount == order.total.amount()))
    }

    fn session(&self, order: &Order, payment: &Payment) -> PaymentSession {
        PaymentSession {
            order_id: order.id,
            order_number: order.order_number.clone(),
            gateway_order_id: payment.gateway_order_id.clone(),
            key_id: self.gateway.key_id().to_string(),
            amount: order.total.minor_units(),
            currency: order.currency().to_string(),
        }
    }

    async fn order(&self, id: Uuid) -> Result<Order> {
        self.orders.get_order(id).await?.ok_or_else(|| StoreError::not_found(format!("order {id}")))
    }

    async fn payment(&self, gateway_order_id: &str) -> Result<Payment> {
        self.orders
            .find_payment(gateway_order_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("payment for gateway order {gateway_order_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, CartItem, CartLine, DeliveryDetails};
    use crate::domain::pricing::LinePrice;
    use crate::domain::value_objects::{Money, Quantity};
    use crate::payment::signature::{sign, SignatureVerifier};
    use crate::payment::GatewayOrder;
    use crate::repository::{CartRepository, MemoryStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use secrecy::Secret;
    use std::sync::atomic::{AtomicU32, Ordering};

    const KEY_SECRET: &str = "test_key_secret";
    const WEBHOOK_SECRET: &str = "test_webhook_secret";

    struct StubGateway {
        created: AtomicU32,
        verifier: SignatureVerifier,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        fn key_id(&self) -> &str { "rzp_test_key" }

        async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(GatewayOrder { id: format!("order_gw{n}"), amount: request.amount, currency: request.currency })
        }

        fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
            self.verifier.verify_payment(order_id, payment_id, signature)
        }

        fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
            self.verifier.verify_webhook(body, signature)
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<StubGateway>,
        svc: PaymentService,
        order: Order,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway {
            created: AtomicU32::new(0),
            verifier: SignatureVerifier::new(Secret::new(KEY_SECRET.into()), Secret::new(WEBHOOK_SECRET.into())),
        });
        let unit = Money::new(Decimal::new(24950, 2), "INR");
        let price = LinePrice { unit_price: unit.clone(), discount: Money::zero("INR"), subtotal: unit.multiply(2) };
        let item = CartItem::new(CartLine::beverage(Uuid::now_v7()), "Cold Coffee", Quantity::new(2).unwrap(), price);
        let cart = Cart::new("C1", "INR");
        store.save_cart(&cart).await.unwrap();
        let mut order = Order::place("ORD-20261019-00000001", "C1", "INR", &[item], DeliveryDetails::default()).unwrap();
        order.take_events();
        assert!(store.place_order(&order, cart.updated_at()).await.unwrap());

        let svc = PaymentService::new(store.clone(), gateway.clone(), EventBus::default());
        Fixture { store, gateway, svc, order }
    }

    fn verify_req(gateway_order_id: &str, payment_id: &str) -> VerifyPayment {
        VerifyPayment {
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: payment_id.into(),
            signature: sign(KEY_SECRET, format!("{gateway_order_id}|{payment_id}").as_bytes()),
        }
    }

    fn webhook(event: &str, gateway_order_id: &str, payment_id: &str) -> (Vec<u8>, String) {
        let body = serde_json::json!({
            "event": event,
            "payload": { "payment": { "entity": {
                "id": payment_id, "order_id": gateway_order_id, "status": "captured",
                "error_description": null
            } } }
        })
        .to_string()
        .into_bytes();
        let sig = sign(WEBHOOK_SECRET, &body);
        (body, sig)
    }

    #[tokio::test]
    async fn test_initiate_creates_gateway_order_in_minor_units() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        assert_eq!(session.amount, 49900);
        assert_eq!(session.key_id, "rzp_test_key");

        let stored = f.store.get_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(stored.gateway_order_id.as_deref(), Some(session.gateway_order_id.as_str()));
        let payment = f.store.find_payment(&session.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentRecordStatus::Created);
    }

    #[tokio::test]
    async fn test_initiate_reuses_open_attempt() {
        let f = fixture().await;
        let first = f.svc.initiate(f.order.id).await.unwrap();
        let second = f.svc.initiate(f.order.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.gateway.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_confirms_order() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let order = f.svc.verify(verify_req(&session.gateway_order_id, "pay_1")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));

        // replay is idempotent
        let again = f.svc.verify(verify_req(&session.gateway_order_id, "pay_1")).await.unwrap();
        assert_eq!(again.status, OrderStatus::Confirmed);
        // another payment for the same gateway order is refused
        let err = f.svc.verify(verify_req(&session.gateway_order_id, "pay_2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // and no new attempts once paid
        assert!(matches!(f.svc.initiate(f.order.id).await, Err(StoreError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_capture_from_a_stale_read_conflicts() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let stale = f.store.find_payment(&session.gateway_order_id).await.unwrap().unwrap();

        f.svc.verify(verify_req(&session.gateway_order_id, "pay_1")).await.unwrap();

        let err = f.svc.capture(stale.clone(), "pay_2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let mut stale = stale;
        let err = f.svc.fail(&mut stale, Some("pay_2"), "card declined").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let payment = f.store.find_payment(&session.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentRecordStatus::Captured);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));
        let order = f.store.get_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_bad_signature_marks_payment_failed() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let mut req = verify_req(&session.gateway_order_id, "pay_1");
        req.signature = sign("wrong", b"x");

        let err = f.svc.verify(req).await.unwrap_err();
        assert!(matches!(err, StoreError::PaymentVerification(_)));
        let order = f.store.get_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Pending);
        let payment = f.store.find_payment(&session.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentRecordStatus::Failed);

        // a failed attempt can be retried with a fresh gateway order
        let retry = f.svc.initiate(f.order.id).await.unwrap();
        assert_ne!(retry.gateway_order_id, session.gateway_order_id);
    }

    #[tokio::test]
    async fn test_verify_unknown_gateway_order() {
        let f = fixture().await;
        let err = f.svc.verify(verify_req("order_missing", "pay_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_webhook_capture_then_client_verify_is_duplicate() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let (body, sig) = webhook("payment.captured", &session.gateway_order_id, "pay_1");

        let outcome = f.svc.handle_webhook(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Captured { order_id: f.order.id });
        let outcome = f.svc.handle_webhook(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate { order_id: f.order.id });

        let order = f.svc.verify(verify_req(&session.gateway_order_id, "pay_1")).await.unwrap();
        assert!(order.is_paid());
    }

    #[tokio::test]
    async fn test_webhook_signature_required() {
        let f = fixture().await;
        let (body, _) = webhook("payment.captured", "order_gw1", "pay_1");
        assert!(matches!(f.svc.handle_webhook(&body, None).await, Err(StoreError::InvalidSignature)));
        assert!(matches!(f.svc.handle_webhook(&body, Some("deadbeef")).await, Err(StoreError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_webhook_failure_after_capture_is_ignored() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let (body, sig) = webhook("payment.failed", &session.gateway_order_id, "pay_0");
        assert_eq!(f.svc.handle_webhook(&body, Some(&sig)).await.unwrap(), WebhookOutcome::Failed { order_id: f.order.id });

        let retry = f.svc.initiate(f.order.id).await.unwrap();
        let (body, sig) = webhook("payment.captured", &retry.gateway_order_id, "pay_1");
        f.svc.handle_webhook(&body, Some(&sig)).await.unwrap();
        let (body, sig) = webhook("payment.failed", &retry.gateway_order_id, "pay_1");
        assert_eq!(f.svc.handle_webhook(&body, Some(&sig)).await.unwrap(), WebhookOutcome::Ignored);

        let order = f.store.get_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unrelated_events_ignored() {
        let f = fixture().await;
        let body = br#"{"event":"refund.created","payload":{}}"#;
        let sig = sign(WEBHOOK_SECRET, body);
        assert_eq!(f.svc.handle_webhook(body, Some(&sig)).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_capture_for_cancelled_order_keeps_it_cancelled() {
        let f = fixture().await;
        let session = f.svc.initiate(f.order.id).await.unwrap();
        let mut order = f.store.get_order(f.order.id).await.unwrap().unwrap();
        order.cancel().unwrap();
        f.store.update_order(&order).await.unwrap();

        let order = f.svc.verify(verify_req(&session.gateway_order_id, "pay_1")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_cannot_initiate_for_cancelled_order() {
        let f = fixture().await;
        let mut order = f.order.clone();
        order.cancel().unwrap();
        f.store.update_order(&order).await.unwrap();
        assert!(matches!(f.svc.initiate(order.id).await, Err(StoreError::InvalidTransition(_))));
        assert_eq!(f.gateway.created.load(Ordering::SeqCst), 0);
    }
}
