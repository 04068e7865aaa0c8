//! Publishes order events to NATS when a connection is configured.

use crate::domain::events::OrderEvent;

const SUBJECT_PREFIX: &str = "pizza.orders";

#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    /// Logs every event and forwards it to NATS. Delivery failures are
    /// logged; the order state is already committed at this point.
    pub async fn publish(&self, events: Vec<OrderEvent>) {
        for event in events {
            tracing::info!(event = event.name(), order_id = %event.order_id(), "order event");
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize order event");
                    continue;
                }
            };
            let subject = format!("{SUBJECT_PREFIX}.{}", event.name());
            if let Err(e) = client.publish(subject, payload.into()).await {
                tracing::warn!(error = %e, event = event.name(), "failed to publish order event");
            }
        }
    }
}
