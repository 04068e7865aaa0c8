use axum::{body::Bytes, extract::{Path, State}, http::{HeaderMap, StatusCode}, Json};
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::Order;
use crate::services::{PaymentSession, VerifyPayment, WebhookOutcome};
use crate::Result;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub async fn initiate(State(s): State<AppState>, Path(order_id): Path<Uuid>) -> Result<(StatusCode, Json<PaymentSession>)> {
    Ok((StatusCode::CREATED, Json(s.payments.initiate(order_id).await?)))
}

pub async fn verify(State(s): State<AppState>, Json(r): Json<VerifyPayment>) -> Result<Json<Order>> {
    Ok(Json(s.payments.verify(r).await?))
}

/// Takes the raw body: the signature is computed over the exact bytes sent.
pub async fn webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookOutcome>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    Ok(Json(s.payments.handle_webhook(&body, signature).await?))
}
