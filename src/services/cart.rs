//! Cart management with live pricing against the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartItem, CartLine, CartTotals};
use crate::domain::pricing::{LinePrice, PizzaSelection, PricingPolicy};
use crate::domain::value_objects::Quantity;
use crate::repository::{CartRepository, CatalogRepository};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddPizza {
    pub pizza_id: Uuid,
    pub size_id: Uuid,
    pub crust_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub topping_ids: Vec<Uuid>,
    #[validate(range(min = 1, max = 50))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddBeverage {
    pub beverage_id: Uuid,
    #[validate(range(min = 1, max = 50))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub customer_id: String,
    pub currency: String,
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
    pub updated_at: DateTime<Utc>,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            customer_id: cart.customer_id().to_string(),
            currency: cart.currency().to_string(),
            items: cart.items().to_vec(),
            totals: cart.totals(),
            updated_at: cart.updated_at(),
        }
    }
}

/// Result of pricing one cart line against the current catalog.
enum Quote {
    Priced { title: String, price: LinePrice },
    /// Something the line refers to is missing or withdrawn.
    Unavailable(String),
}

#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn CatalogRepository>,
    carts: Arc<dyn CartRepository>,
    pricing: PricingPolicy,
}

impl CartService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, carts: Arc<dyn CartRepository>, pricing: PricingPolicy) -> Self {
        Self { catalog, carts, pricing }
    }

    /// Current cart, re-priced against today's catalog. A customer
    /// without a cart gets an empty one.
    pub async fn get_cart(&self, customer_id: &str) -> Result<CartView> {
        let mut cart = self.load(customer_id).await?;
        self.reprice(&mut cart, Utc::now()).await?;
        Ok(CartView::from(&cart))
    }

    #[instrument(skip(self, req), fields(pizza_id = %req.pizza_id))]
    pub async fn add_pizza(&self, customer_id: &str, req: AddPizza) -> Result<CartView> {
        req.validate()?;
        let line = CartLine::pizza(req.pizza_id, req.size_id, req.crust_id, req.topping_ids);
        self.add_line(customer_id, line, req.quantity).await
    }

    #[instrument(skip(self, req), fields(beverage_id = %req.beverage_id))]
    pub async fn add_beverage(&self, customer_id: &str, req: AddBeverage) -> Result<CartView> {
        req.validate()?;
        self.add_line(customer_id, CartLine::beverage(req.beverage_id), req.quantity).await
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(&self, customer_id: &str, item_id: Uuid, quantity: u32) -> Result<CartView> {
        let mut cart = self.existing(customer_id, item_id).await?;
        cart.update_quantity(item_id, quantity)?;
        self.reprice(&mut cart, Utc::now()).await?;
        self.carts.save_cart(&cart).await?;
        Ok(CartView::from(&cart))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, customer_id: &str, item_id: Uuid) -> Result<CartView> {
        let mut cart = self.existing(customer_id, item_id).await?;
        cart.remove_item(item_id)?;
        self.carts.save_cart(&cart).await?;
        Ok(CartView::from(&cart))
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, customer_id: &str) -> Result<()> {
        self.carts.delete_cart(customer_id).await
    }

    /// Refreshes every line's price and availability. Lines whose
    /// catalog items were withdrawn stay in the cart, flagged unavailable.
    pub(crate) async fn reprice(&self, cart: &mut Cart, now: DateTime<Utc>) -> Result<()> {
        for item in cart.items_mut() {
            match self.quote(&item.line, item.quantity, now).await? {
                Quote::Priced { title, price } => {
                    item.title = title;
                    item.apply_price(price);
                }
                Quote::Unavailable(reason) => {
                    tracing::debug!(item_id = %item.id, %reason, "cart line unavailable");
                    item.available = false;
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn load(&self, customer_id: &str) -> Result<Cart> {
        Ok(self.carts.get_cart(customer_id).await?.unwrap_or_else(|| Cart::new(customer_id, &self.pricing.currency)))
    }

    async fn existing(&self, customer_id: &str, item_id: Uuid) -> Result<Cart> {
        self.carts.get_cart(customer_id).await?.ok_or_else(|| StoreError::not_found(format!("cart item {item_id}")))
    }

    async fn add_line(&self, customer_id: &str, line: CartLine, quantity: u32) -> Result<CartView> {
        let quantity = Quantity::new(quantity)?;
        let now = Utc::now();
        let item = match self.quote(&line, quantity, now).await? {
            Quote::Priced { title, price } => CartItem::new(line, title, quantity, price),
            Quote::Unavailable(what) => return Err(StoreError::NotFound(what)),
        };

        let mut cart = self.load(customer_id).await?;
        let item_id = cart.add_item(item)?;
        self.reprice(&mut cart, now).await?;
        self.carts.save_cart(&cart).await?;
        tracing::info!(customer_id, %item_id, "cart line added");
        Ok(CartView::from(&cart))
    }

    async fn quote(&self, line: &CartLine, quantity: Quantity, now: DateTime<Utc>) -> Result<Quote> {
        match line {
            CartLine::Pizza { pizza_id, size_id, crust_id, topping_ids } => {
                let Some(pizza) = self.catalog.get_pizza(*pizza_id).await?.filter(|p| p.is_available) else {
                    return Ok(Quote::Unavailable(format!("pizza {pizza_id}")));
                };
                let Some(size) = self.catalog.get_size(*size_id).await?.filter(|s| s.is_available) else {
                    return Ok(Quote::Unavailable(format!("size {size_id}")));
                };
                let Some(crust) = self.catalog.get_crust(*crust_id).await?.filter(|c| c.is_available) else {
                    return Ok(Quote::Unavailable(format!("crust {crust_id}")));
                };
                let toppings = self.catalog.get_toppings(topping_ids).await?;
                if let Some(missing) = topping_ids.iter().find(|id| !toppings.iter().any(|t| t.id == **id && t.is_available)) {
                    return Ok(Quote::Unavailable(format!("topping {missing}")));
                }

                let selection = PizzaSelection { pizza: &pizza, size: &size, crust: &crust, toppings: &toppings };
                let mut title = format!("{} ({}, {})", pizza.name, size.name, crust.name);
                if !toppings.is_empty() {
                    let mut names: Vec<&str> = toppings.iter().map(|t| t.name.as_str()).collect();
                    names.sort_unstable();
                    title.push_str(" + ");
                    title.push_str(&names.join(", "));
                }
                Ok(Quote::Priced { title, price: self.pricing.price_pizza(&selection, quantity, now) })
            }
            CartLine::Beverage { beverage_id } => match self.catalog.get_beverage(*beverage_id).await?.filter(|b| b.is_available) {
                Some(beverage) => Ok(Quote::Priced { title: beverage.name.clone(), price: self.pricing.price_beverage(&beverage, quantity) }),
                None => Ok(Quote::Unavailable(format!("beverage {beverage_id}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Beverage, Crust, Pizza, PizzaSize, Topping};
    use crate::repository::MemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        svc: CartService,
        pizza: Pizza,
        size: PizzaSize,
        crust: Crust,
        olives: Topping,
        paneer: Topping,
        cola: Beverage,
    }

    /// Catalog with a pizza old enough to be outside the discount window.
    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut pizza = Pizza::create("Margherita", None, Decimal::from(200), true).unwrap();
        pizza.created_at = Utc::now() - Duration::days(90);
        let size = PizzaSize::create("Large", Decimal::new(15, 1)).unwrap();
        let crust = Crust::create("Cheese Burst", Decimal::new(12, 1)).unwrap();
        let olives = Topping::create("Olives", Decimal::from(30), true).unwrap();
        let paneer = Topping::create("Paneer", Decimal::new(4550, 2), true).unwrap();
        let cola = Beverage::create("Cola", None, Decimal::from(60), Some(500)).unwrap();

        store.save_pizza(&pizza).await.unwrap();
        store.save_size(&size).await.unwrap();
        store.save_crust(&crust).await.unwrap();
        store.save_topping(&olives).await.unwrap();
        store.save_topping(&paneer).await.unwrap();
        store.save_beverage(&cola).await.unwrap();

        let svc = CartService::new(store.clone(), store.clone(), PricingPolicy::default());
        Fixture { store, svc, pizza, size, crust, olives, paneer, cola }
    }

    fn add_pizza(f: &Fixture, toppings: Vec<Uuid>, quantity: u32) -> AddPizza {
        AddPizza { pizza_id: f.pizza.id, size_id: f.size.id, crust_id: f.crust.id, topping_ids: toppings, quantity }
    }

    #[tokio::test]
    async fn test_add_pizza_prices_configuration() {
        let f = fixture().await;
        let view = f.svc.add_pizza("C1", add_pizza(&f, vec![f.olives.id, f.paneer.id], 2)).await.unwrap();
        let item = &view.items[0];
        assert_eq!(item.unit_price.amount(), Decimal::new(43550, 2));
        assert!(item.discount.is_zero());
        assert_eq!(view.totals.total.amount(), Decimal::from(871));
        assert_eq!(item.title, "Margherita (Large, Cheese Burst) + Olives, Paneer");
    }

    #[tokio::test]
    async fn test_new_pizza_discount_applies() {
        let f = fixture().await;
        let mut fresh = f.pizza.clone();
        fresh.created_at = Utc::now() - Duration::days(3);
        f.store.save_pizza(&fresh).await.unwrap();

        let view = f.svc.add_pizza("C1", add_pizza(&f, vec![], 1)).await.unwrap();
        // 200 * 1.5 * 1.2 = 360, 10% off
        assert_eq!(view.totals.discount.amount(), Decimal::from(36));
        assert_eq!(view.totals.total.amount(), Decimal::from(324));
    }

    #[tokio::test]
    async fn test_same_configuration_merges_regardless_of_topping_order() {
        let f = fixture().await;
        f.svc.add_pizza("C1", add_pizza(&f, vec![f.olives.id, f.paneer.id], 1)).await.unwrap();
        let view = f.svc.add_pizza("C1", add_pizza(&f, vec![f.paneer.id, f.olives.id], 2)).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity.value(), 3);
    }

    #[tokio::test]
    async fn test_add_rejects_unknown_or_withdrawn_items() {
        let f = fixture().await;
        let err = f.svc.add_pizza("C1", AddPizza { size_id: Uuid::now_v7(), ..add_pizza(&f, vec![], 1) }).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let mut olives = f.olives.clone();
        olives.is_available = false;
        f.store.save_topping(&olives).await.unwrap();
        let err = f.svc.add_pizza("C1", add_pizza(&f, vec![f.olives.id], 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let f = fixture().await;
        let err = f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 0 }).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 51 }).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 30 }).await.unwrap();
        let err = f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 30 }).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_remove_and_clear() {
        let f = fixture().await;
        let view = f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 1 }).await.unwrap();
        let item_id = view.items[0].id;

        let view = f.svc.update_item("C1", item_id, 3).await.unwrap();
        assert_eq!(view.totals.total.amount(), Decimal::from(180));

        let view = f.svc.remove_item("C1", item_id).await.unwrap();
        assert!(view.items.is_empty());
        assert!(matches!(f.svc.remove_item("C1", item_id).await, Err(StoreError::NotFound(_))));

        f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 1 }).await.unwrap();
        f.svc.clear("C1").await.unwrap();
        assert!(f.svc.get_cart("C1").await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_withdrawn_item_flagged_on_read() {
        let f = fixture().await;
        f.svc.add_pizza("C1", add_pizza(&f, vec![], 1)).await.unwrap();
        f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 2 }).await.unwrap();

        let mut cola = f.cola.clone();
        cola.is_available = false;
        f.store.save_beverage(&cola).await.unwrap();

        let view = f.svc.get_cart("C1").await.unwrap();
        assert_eq!(view.items.len(), 2);
        assert!(!view.items.iter().find(|i| i.title == "Cola").unwrap().available);
        assert_eq!(view.totals.total.amount(), Decimal::from(360));
        assert_eq!(view.totals.item_count, 1);
    }

    #[tokio::test]
    async fn test_price_change_reflected_on_read() {
        let f = fixture().await;
        f.svc.add_beverage("C1", AddBeverage { beverage_id: f.cola.id, quantity: 2 }).await.unwrap();
        let mut cola = f.cola.clone();
        cola.price = Decimal::from(70);
        f.store.save_beverage(&cola).await.unwrap();

        assert_eq!(f.svc.get_cart("C1").await.unwrap().totals.total.amount(), Decimal::from(140));
    }
}
