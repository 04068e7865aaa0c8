use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{Beverage, Crust, Menu, Pizza, PizzaSize, Topping};
use crate::repository::{Page, PizzaFilter};
use crate::services::{NewBeverage, NewOption, NewPizza, NewTopping, Paginated};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct PizzaParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub vegetarian: Option<bool>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_unavailable: bool,
}

#[derive(Debug, Deserialize)]
pub struct OptionParams {
    #[serde(default)]
    pub include_unavailable: bool,
}

pub async fn menu(State(s): State<AppState>) -> Result<Json<Menu>> {
    Ok(Json(s.catalog.menu().await?))
}

pub async fn list_pizzas(State(s): State<AppState>, Query(p): Query<PizzaParams>) -> Result<Json<Paginated<Pizza>>> {
    let filter = PizzaFilter { vegetarian: p.vegetarian, search: p.search.filter(|q| !q.trim().is_empty()), include_unavailable: p.include_unavailable };
    Ok(Json(s.catalog.list_pizzas(filter, Page { page: p.page, per_page: p.per_page }).await?))
}

pub async fn get_pizza(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Pizza>> {
    Ok(Json(s.catalog.get_pizza(id).await?))
}

pub async fn create_pizza(State(s): State<AppState>, Json(r): Json<NewPizza>) -> Result<(StatusCode, Json<Pizza>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_pizza(r).await?)))
}

pub async fn update_pizza(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewPizza>) -> Result<Json<Pizza>> {
    Ok(Json(s.catalog.update_pizza(id, r).await?))
}

pub async fn delete_pizza(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_pizza(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_sizes(State(s): State<AppState>, Query(p): Query<OptionParams>) -> Result<Json<Vec<PizzaSize>>> {
    Ok(Json(s.catalog.list_sizes(p.include_unavailable).await?))
}

pub async fn get_size(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PizzaSize>> {
    Ok(Json(s.catalog.get_size(id).await?))
}

pub async fn create_size(State(s): State<AppState>, Json(r): Json<NewOption>) -> Result<(StatusCode, Json<PizzaSize>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_size(r).await?)))
}

pub async fn update_size(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewOption>) -> Result<Json<PizzaSize>> {
    Ok(Json(s.catalog.update_size(id, r).await?))
}

pub async fn delete_size(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_size(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_crusts(State(s): State<AppState>, Query(p): Query<OptionParams>) -> Result<Json<Vec<Crust>>> {
    Ok(Json(s.catalog.list_crusts(p.include_unavailable).await?))
}

pub async fn get_crust(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Crust>> {
    Ok(Json(s.catalog.get_crust(id).await?))
}

pub async fn create_crust(State(s): State<AppState>, Json(r): Json<NewOption>) -> Result<(StatusCode, Json<Crust>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_crust(r).await?)))
}

pub async fn update_crust(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewOption>) -> Result<Json<Crust>> {
    Ok(Json(s.catalog.update_crust(id, r).await?))
}

pub async fn delete_crust(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_crust(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_toppings(State(s): State<AppState>, Query(p): Query<OptionParams>) -> Result<Json<Vec<Topping>>> {
    Ok(Json(s.catalog.list_toppings(p.include_unavailable).await?))
}

pub async fn get_topping(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Topping>> {
    Ok(Json(s.catalog.get_topping(id).await?))
}

pub async fn create_topping(State(s): State<AppState>, Json(r): Json<NewTopping>) -> Result<(StatusCode, Json<Topping>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_topping(r).await?)))
}

pub async fn update_topping(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewTopping>) -> Result<Json<Topping>> {
    Ok(Json(s.catalog.update_topping(id, r).await?))
}

pub async fn delete_topping(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_topping(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_beverages(State(s): State<AppState>, Query(p): Query<OptionParams>) -> Result<Json<Vec<Beverage>>> {
    Ok(Json(s.catalog.list_beverages(p.include_unavailable).await?))
}

pub async fn get_beverage(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Beverage>> {
    Ok(Json(s.catalog.get_beverage(id).await?))
}

pub async fn create_beverage(State(s): State<AppState>, Json(r): Json<NewBeverage>) -> Result<(StatusCode, Json<Beverage>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_beverage(r).await?)))
}

pub async fn update_beverage(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewBeverage>) -> Result<Json<Beverage>> {
    Ok(Json(s.catalog.update_beverage(id, r).await?))
}

pub async fn delete_beverage(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_beverage(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
