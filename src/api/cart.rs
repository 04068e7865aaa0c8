use axum::{extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::services::{AddBeverage, AddPizza, CartView};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    pub quantity: u32,
}

pub async fn get_cart(State(s): State<AppState>, Path(customer_id): Path<String>) -> Result<Json<CartView>> {
    Ok(Json(s.carts.get_cart(&customer_id).await?))
}

pub async fn add_pizza(State(s): State<AppState>, Path(customer_id): Path<String>, Json(r): Json<AddPizza>) -> Result<(StatusCode, Json<CartView>)> {
    Ok((StatusCode::CREATED, Json(s.carts.add_pizza(&customer_id, r).await?)))
}

pub async fn add_beverage(State(s): State<AppState>, Path(customer_id): Path<String>, Json(r): Json<AddBeverage>) -> Result<(StatusCode, Json<CartView>)> {
    Ok((StatusCode::CREATED, Json(s.carts.add_beverage(&customer_id, r).await?)))
}

pub async fn update_item(State(s): State<AppState>, Path((customer_id, item_id)): Path<(String, Uuid)>, Json(r): Json<UpdateQuantity>) -> Result<Json<CartView>> {
    Ok(Json(s.carts.update_item(&customer_id, item_id, r.quantity).await?))
}

pub async fn remove_item(State(s): State<AppState>, Path((customer_id, item_id)): Path<(String, Uuid)>) -> Result<Json<CartView>> {
    Ok(Json(s.carts.remove_item(&customer_id, item_id).await?))
}

pub async fn clear_cart(State(s): State<AppState>, Path(customer_id): Path<String>) -> Result<StatusCode> {
    s.carts.clear(&customer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
