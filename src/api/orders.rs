use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::repository::{OrderFilter, Page};
use crate::services::{Paginated, PlaceOrder};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

pub async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Paginated<Order>>> {
    let filter = OrderFilter { customer_id: p.customer_id, status: p.status };
    Ok(Json(s.orders.list_orders(filter, Page { page: p.page, per_page: p.per_page }).await?))
}

pub async fn place_order(State(s): State<AppState>, Json(r): Json<PlaceOrder>) -> Result<(StatusCode, Json<Order>)> {
    Ok((StatusCode::CREATED, Json(s.orders.place_order(r).await?)))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get_order(id).await?))
}

pub async fn update_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> Result<Json<Order>> {
    Ok(Json(s.orders.update_status(id, r.status).await?))
}

pub async fn cancel_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.cancel(id).await?))
}
