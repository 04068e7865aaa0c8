//! Menu management and browsing.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::Paginated;
use crate::domain::aggregates::{Beverage, Crust, Menu, Pizza, PizzaSize, Topping};
use crate::repository::{CatalogRepository, Page, PizzaFilter};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPizza {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub base_price: Decimal,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_vegetarian: bool,
    pub is_available: Option<bool>,
}

/// Size or crust.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOption {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
    pub multiplier: Decimal,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTopping {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
    pub price: Decimal,
    #[serde(default = "default_true")]
    pub is_vegetarian: bool,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBeverage {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 1, max = 5000))]
    pub volume_ml: Option<i32>,
    pub is_available: Option<bool>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        Self { repo }
    }

    /// Everything a customer can currently order.
    pub async fn menu(&self) -> Result<Menu> {
        Ok(Menu {
            pizzas: self.repo.list_available_pizzas().await?,
            sizes: self.repo.list_sizes(false).await?,
            crusts: self.repo.list_crusts(false).await?,
            toppings: self.repo.list_toppings(false).await?,
            beverages: self.repo.list_beverages(false).await?,
        })
    }

    // -- pizzas ---------------------------------------------------------------

    pub async fn list_pizzas(&self, filter: PizzaFilter, page: Page) -> Result<Paginated<Pizza>> {
        Ok(Paginated::new(self.repo.list_pizzas(&filter, page).await?, page))
    }

    pub async fn get_pizza(&self, id: Uuid) -> Result<Pizza> {
        self.repo.get_pizza(id).await?.ok_or_else(|| StoreError::not_found(format!("pizza {id}")))
    }

    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_pizza(&self, req: NewPizza) -> Result<Pizza> {
        req.validate()?;
        let mut pizza = Pizza::create(req.name, req.description, req.base_price, req.is_vegetarian)?;
        pizza.image_url = req.image_url;
        pizza.is_available = req.is_available.unwrap_or(true);
        self.repo.save_pizza(&pizza).await?;
        tracing::info!(pizza_id = %pizza.id, "pizza created");
        Ok(pizza)
    }

    #[instrument(skip(self, req))]
    pub async fn update_pizza(&self, id: Uuid, req: NewPizza) -> Result<Pizza> {
        req.validate()?;
        let mut pizza = self.get_pizza(id).await?;
        pizza.name = req.name.trim().to_string();
        pizza.description = req.description;
        pizza.base_price = req.base_price;
        pizza.image_url = req.image_url;
        pizza.is_vegetarian = req.is_vegetarian;
        if let Some(available) = req.is_available { pizza.is_available = available; }
        pizza.validate()?;
        pizza.touch();
        self.repo.save_pizza(&pizza).await?;
        Ok(pizza)
    }

    #[instrument(skip(self))]
    pub async fn delete_pizza(&self, id: Uuid) -> Result<()> {
        let mut pizza = self.get_pizza(id).await?;
        pizza.withdraw();
        self.repo.save_pizza(&pizza).await?;
        tracing::info!(pizza_id = %id, "pizza withdrawn from menu");
        Ok(())
    }

    // -- sizes ----------------------------------------------------------------

    pub async fn list_sizes(&self, include_unavailable: bool) -> Result<Vec<PizzaSize>> {
        self.repo.list_sizes(include_unavailable).await
    }

    pub async fn get_size(&self, id: Uuid) -> Result<PizzaSize> {
        self.repo.get_size(id).await?.ok_or_else(|| StoreError::not_found(format!("size {id}")))
    }

    pub async fn create_size(&self, req: NewOption) -> Result<PizzaSize> {
        req.validate()?;
        let mut size = PizzaSize::create(req.name, req.multiplier)?;
        size.is_available = req.is_available.unwrap_or(true);
        self.repo.save_size(&size).await?;
        Ok(size)
    }

    pub async fn update_size(&self, id: Uuid, req: NewOption) -> Result<PizzaSize> {
        req.validate()?;
        let mut size = self.get_size(id).await?;
        size.name = req.name.trim().to_string();
        size.multiplier = req.multiplier;
        if let Some(available) = req.is_available { size.is_available = available; }
        size.validate()?;
        self.repo.save_size(&size).await?;
        Ok(size)
    }

    pub async fn delete_size(&self, id: Uuid) -> Result<()> {
        let mut size = self.get_size(id).await?;
        size.is_available = false;
        self.repo.save_size(&size).await
    }

    // -- crusts ---------------------------------------------------------------

    pub async fn list_crusts(&self, include_unavailable: bool) -> Result<Vec<Crust>> {
        self.repo.list_crusts(include_unavailable).await
    }

    pub async fn get_crust(&self, id: Uuid) -> Result<Crust> {
        self.repo.get_crust(id).await?.ok_or_else(|| StoreError::not_found(format!("crust {id}")))
    }

    pub async fn create_crust(&self, req: NewOption) -> Result<Crust> {
        req.validate()?;
        let mut crust = Crust::create(req.name, req.multiplier)?;
        crust.is_available = req.is_available.unwrap_or(true);
        self.repo.save_crust(&crust).await?;
        Ok(crust)
    }

    pub async fn update_crust(&self, id: Uuid, req: NewOption) -> Result<Crust> {
        req.validate()?;
        let mut crust = self.get_crust(id).await?;
        crust.name = req.name.trim().to_string();
        crust.multiplier = req.multiplier;
        if let Some(available) = req.is_available { crust.is_available = available; }
        crust.validate()?;
        self.repo.save_crust(&crust).await?;
        Ok(crust)
    }

    pub async fn delete_crust(&self, id: Uuid) -> Result<()> {
        let mut crust = self.get_crust(id).await?;
        crust.is_available = false;
        self.repo.save_crust(&crust).await
    }

    // -- toppings -------------------------------------------------------------

    pub async fn list_toppings(&self, include_unavailable: bool) -> Result<Vec<Topping>> {
        self.repo.list_toppings(include_unavailable).await
    }

    pub async fn get_topping(&self, id: Uuid) -> Result<Topping> {
        self.repo.get_toppings(&[id]).await?.pop().ok_or_else(|| StoreError::not_found(format!("topping {id}")))
    }

    pub async fn create_topping(&self, req: NewTopping) -> Result<Topping> {
        req.validate()?;
        let mut topping = Topping::create(req.name, req.price, req.is_vegetarian)?;
        topping.is_available = req.is_available.unwrap_or(true);
        self.repo.save_topping(&topping).await?;
        Ok(topping)
    }

    pub async fn update_topping(&self, id: Uuid, req: NewTopping) -> Result<Topping> {
        req.validate()?;
        let mut topping = self.get_topping(id).await?;
        topping.name = req.name.trim().to_string();
        topping.price = req.price;
        topping.is_vegetarian = req.is_vegetarian;
        if let Some(available) = req.is_available { topping.is_available = available; }
        topping.validate()?;
        self.repo.save_topping(&topping).await?;
        Ok(topping)
    }

    pub async fn delete_topping(&self, id: Uuid) -> Result<()> {
        let mut topping = self.get_topping(id).await?;
        topping.is_available = false;
        self.repo.save_topping(&topping).await
    }

    // -- beverages ------------------------------------------------------------

    pub async fn list_beverages(&self, include_unavailable: bool) -> Result<Vec<Beverage>> {
        self.repo.list_beverages(include_unavailable).await
    }

    pub async fn get_beverage(&self, id: Uuid) -> Result<Beverage> {
        self.repo.get_beverage(id).await?.ok_or_else(|| StoreError::not_found(format!("beverage {id}")))
    }

    pub async fn create_beverage(&self, req: NewBeverage) -> Result<Beverage> {
        req.validate()?;
        let mut beverage = Beverage::create(req.name, req.description, req.price, req.volume_ml)?;
        beverage.is_available = req.is_available.unwrap_or(true);
        self.repo.save_beverage(&beverage).await?;
        Ok(beverage)
    }

    pub async fn update_beverage(&self, id: Uuid, req: NewBeverage) -> Result<Beverage> {
        req.validate()?;
        let mut beverage = self.get_beverage(id).await?;
        beverage.name = req.name.trim().to_string();
        beverage.description = req.description;
        beverage.price = req.price;
        beverage.volume_ml = req.volume_ml;
        if let Some(available) = req.is_available { beverage.is_available = available; }
        beverage.validate()?;
        self.repo.save_beverage(&beverage).await?;
        Ok(beverage)
    }

    pub async fn delete_beverage(&self, id: Uuid) -> Result<()> {
        let mut beverage = self.get_beverage(id).await?;
        beverage.is_available = false;
        self.repo.save_beverage(&beverage).await
    }
}
