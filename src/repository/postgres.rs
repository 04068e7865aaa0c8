//! PostgreSQL repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{CartRepository, CatalogRepository, OrderFilter, OrderRepository, Page, PizzaFilter};
use crate::domain::aggregates::{
    Beverage, Cart, CartItem, CartLine, Crust, DeliveryDetails, Order, OrderItem, Payment, Pizza, PizzaSize, Topping,
};
use crate::domain::value_objects::{Money, Quantity};
use crate::{Result, StoreError};

/// Maps sqlx errors onto store errors, keeping constraint violations distinct.
pub fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::not_found("record"),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::conflict("duplicate entry violates unique constraint"),
            Some("23503") => StoreError::validation("referenced record does not exist"),
            Some("23514") => StoreError::validation("check constraint violation"),
            Some("23502") => StoreError::validation("required value missing"),
            Some("22003") => StoreError::validation("numeric value out of range"),
            Some(code) => StoreError::Storage(format!("database error ({code}): {db_err}")),
            None => StoreError::Storage(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Storage("database connection pool timeout".into()),
        sqlx::Error::PoolClosed => StoreError::Storage("database connection pool is closed".into()),
        _ => StoreError::Storage(e.to_string()),
    }
}

/// Substring pattern for `ILIKE ... ESCAPE '\'` with the term's own
/// wildcards taken literally.
fn like_pattern(term: &str) -> String {
    let escaped = term.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("corrupt row: {what}"))
}

async fn begin(pool: &PgPool) -> Result<Transaction<'static, Postgres>> {
    pool.begin().await.map_err(|e| StoreError::Storage(format!("failed to begin transaction: {e}")))
}

// =============================================================================
// Catalog
// =============================================================================

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn list_pizzas(&self, filter: &PizzaFilter, page: Page) -> Result<(Vec<Pizza>, i64)> {
        let search = filter.search.as_deref().map(like_pattern);
        let pizzas = sqlx::query_as::<_, Pizza>(
            r#"
            SELECT * FROM pizzas
            WHERE ($1 OR is_available)
              AND ($2::boolean IS NULL OR is_vegetarian = $2)
              AND ($3::text IS NULL OR name ILIKE $3 ESCAPE '\')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.include_unavailable)
        .bind(filter.vegetarian)
        .bind(&search)
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM pizzas
            WHERE ($1 OR is_available)
              AND ($2::boolean IS NULL OR is_vegetarian = $2)
              AND ($3::text IS NULL OR name ILIKE $3 ESCAPE '\')
            "#,
        )
        .bind(filter.include_unavailable)
        .bind(filter.vegetarian)
        .bind(&search)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((pizzas, total.0))
    }

    async fn list_available_pizzas(&self) -> Result<Vec<Pizza>> {
        sqlx::query_as::<_, Pizza>("SELECT * FROM pizzas WHERE is_available ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_pizza(&self, id: Uuid) -> Result<Option<Pizza>> {
        sqlx::query_as::<_, Pizza>("SELECT * FROM pizzas WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn save_pizza(&self, p: &Pizza) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pizzas (id, name, description, base_price, image_url, is_vegetarian, is_available, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, description = EXCLUDED.description, base_price = EXCLUDED.base_price,
                image_url = EXCLUDED.image_url, is_vegetarian = EXCLUDED.is_vegetarian,
                is_available = EXCLUDED.is_available, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.base_price)
        .bind(&p.image_url)
        .bind(p.is_vegetarian)
        .bind(p.is_available)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_sizes(&self, include_unavailable: bool) -> Result<Vec<PizzaSize>> {
        sqlx::query_as::<_, PizzaSize>("SELECT * FROM pizza_sizes WHERE ($1 OR is_available) ORDER BY multiplier, name")
            .bind(include_unavailable)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_size(&self, id: Uuid) -> Result<Option<PizzaSize>> {
        sqlx::query_as::<_, PizzaSize>("SELECT * FROM pizza_sizes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn save_size(&self, s: &PizzaSize) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pizza_sizes (id, name, multiplier, is_available) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, multiplier = EXCLUDED.multiplier, is_available = EXCLUDED.is_available
            "#,
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(s.multiplier)
        .bind(s.is_available)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_crusts(&self, include_unavailable: bool) -> Result<Vec<Crust>> {
        sqlx::query_as::<_, Crust>("SELECT * FROM crusts WHERE ($1 OR is_available) ORDER BY name")
            .bind(include_unavailable)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_crust(&self, id: Uuid) -> Result<Option<Crust>> {
        sqlx::query_as::<_, Crust>("SELECT * FROM crusts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn save_crust(&self, c: &Crust) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crusts (id, name, multiplier, is_available) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, multiplier = EXCLUDED.multiplier, is_available = EXCLUDED.is_available
            "#,
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(c.multiplier)
        .bind(c.is_available)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_toppings(&self, include_unavailable: bool) -> Result<Vec<Topping>> {
        sqlx::query_as::<_, Topping>("SELECT * FROM toppings WHERE ($1 OR is_available) ORDER BY name")
            .bind(include_unavailable)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_toppings(&self, ids: &[Uuid]) -> Result<Vec<Topping>> {
        sqlx::query_as::<_, Topping>("SELECT * FROM toppings WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn save_topping(&self, t: &Topping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO toppings (id, name, price, is_vegetarian, is_available) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, price = EXCLUDED.price,
                is_vegetarian = EXCLUDED.is_vegetarian, is_available = EXCLUDED.is_available
            "#,
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(t.price)
        .bind(t.is_vegetarian)
        .bind(t.is_available)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_beverages(&self, include_unavailable: bool) -> Result<Vec<Beverage>> {
        sqlx::query_as::<_, Beverage>("SELECT * FROM beverages WHERE ($1 OR is_available) ORDER BY name")
            .bind(include_unavailable)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_beverage(&self, id: Uuid) -> Result<Option<Beverage>> {
        sqlx::query_as::<_, Beverage>("SELECT * FROM beverages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn save_beverage(&self, b: &Beverage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO beverages (id, name, description, price, volume_ml, is_available, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, description = EXCLUDED.description, price = EXCLUDED.price,
                volume_ml = EXCLUDED.volume_ml, is_available = EXCLUDED.is_available
            "#,
        )
        .bind(b.id)
        .bind(&b.name)
        .bind(&b.description)
        .bind(b.price)
        .bind(b.volume_ml)
        .bind(b.is_available)
        .bind(b.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

// =============================================================================
// Line columns shared by cart_items and order_items
// =============================================================================

struct LineColumns {
    kind: &'static str,
    pizza_id: Option<Uuid>,
    size_id: Option<Uuid>,
    crust_id: Option<Uuid>,
    topping_ids: Vec<Uuid>,
    beverage_id: Option<Uuid>,
}

impl From<&CartLine> for LineColumns {
    fn from(line: &CartLine) -> Self {
        match line {
            CartLine::Pizza { pizza_id, size_id, crust_id, topping_ids } => Self {
                kind: "pizza", pizza_id: Some(*pizza_id), size_id: Some(*size_id), crust_id: Some(*crust_id),
                topping_ids: topping_ids.clone(), beverage_id: None,
            },
            CartLine::Beverage { beverage_id } => Self {
                kind: "beverage", pizza_id: None, size_id: None, crust_id: None, topping_ids: vec![],
                beverage_id: Some(*beverage_id),
            },
        }
    }
}

fn line_from_columns(
    kind: &str,
    pizza_id: Option<Uuid>,
    size_id: Option<Uuid>,
    crust_id: Option<Uuid>,
    topping_ids: Vec<Uuid>,
    beverage_id: Option<Uuid>,
) -> Result<CartLine> {
    match (kind, pizza_id, size_id, crust_id, beverage_id) {
        ("pizza", Some(p), Some(s), Some(c), None) => Ok(CartLine::Pizza { pizza_id: p, size_id: s, crust_id: c, topping_ids }),
        ("beverage", None, None, None, Some(b)) => Ok(CartLine::Beverage { beverage_id: b }),
        _ => Err(corrupt(format!("line of kind '{kind}' has inconsistent references"))),
    }
}

// =============================================================================
// Carts
// =============================================================================

#[derive(sqlx::FromRow)]
struct CartRow {
    customer_id: String,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    kind: String,
    pizza_id: Option<Uuid>,
    size_id: Option<Uuid>,
    crust_id: Option<Uuid>,
    topping_ids: Vec<Uuid>,
    beverage_id: Option<Uuid>,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
    subtotal: Decimal,
    available: bool,
}

impl CartItemRow {
    fn into_item(self, currency: &str) -> Result<CartItem> {
        let line = line_from_columns(&self.kind, self.pizza_id, self.size_id, self.crust_id, self.topping_ids, self.beverage_id)?;
        let quantity = u32::try_from(self.quantity).map_err(corrupt)?;
        Ok(CartItem {
            id: self.id,
            line,
            title: self.title,
            quantity: Quantity::new(quantity).map_err(corrupt)?,
            unit_price: Money::new(self.unit_price, currency),
            discount: Money::new(self.discount, currency),
            subtotal: Money::new(self.subtotal, currency),
            available: self.available,
        })
    }
}

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn get_cart(&self, customer_id: &str) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, kind, pizza_id, size_id, crust_id, topping_ids, beverage_id, title,
                   quantity, unit_price, discount, subtotal, available
            FROM cart_items WHERE customer_id = $1 ORDER BY position
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|r| r.into_item(&row.currency))
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart::restore(row.customer_id, row.currency, items, row.created_at, row.updated_at)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = begin(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO carts (customer_id, currency, created_at, updated_at) VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_id) DO UPDATE SET currency = EXCLUDED.currency, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.customer_id())
        .bind(cart.currency())
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
            .bind(cart.customer_id())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, item) in cart.items().iter().enumerate() {
            let cols = LineColumns::from(&item.line);
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, customer_id, position, kind, pizza_id, size_id, crust_id, topping_ids,
                                        beverage_id, title, quantity, unit_price, discount, subtotal, available)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(item.id)
            .bind(cart.customer_id())
            .bind(position as i32)
            .bind(cols.kind)
            .bind(cols.pizza_id)
            .bind(cols.size_id)
            .bind(cols.crust_id)
            .bind(&cols.topping_ids)
            .bind(cols.beverage_id)
            .bind(&item.title)
            .bind(item.quantity.value() as i32)
            .bind(item.unit_price.amount())
            .bind(item.discount.amount())
            .bind(item.subtotal.amount())
            .bind(item.available)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete_cart(&self, customer_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

// =============================================================================
// Orders and payments
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: String,
    subtotal: Decimal,
    discount: Decimal,
    total: Decimal,
    currency: String,
    status: String,
    payment_status: String,
    delivery_address: String,
    phone: String,
    notes: Option<String>,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    kind: String,
    pizza_id: Option<Uuid>,
    size_id: Option<Uuid>,
    crust_id: Option<Uuid>,
    topping_ids: Vec<Uuid>,
    beverage_id: Option<Uuid>,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
    subtotal: Decimal,
}

impl OrderItemRow {
    fn into_item(self) -> Result<OrderItem> {
        Ok(OrderItem {
            id: self.id,
            line: line_from_columns(&self.kind, self.pizza_id, self.size_id, self.crust_id, self.topping_ids, self.beverage_id)?,
            title: self.title,
            quantity: u32::try_from(self.quantity).map_err(corrupt)?,
            unit_price: self.unit_price,
            discount: self.discount,
            subtotal: self.subtotal,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            items,
            subtotal: Money::new(self.subtotal, &self.currency),
            discount: Money::new(self.discount, &self.currency),
            total: Money::new(self.total, &self.currency),
            status: self.status.parse().map_err(corrupt)?,
            payment_status: self.payment_status.parse().map_err(corrupt)?,
            delivery: DeliveryDetails { address: self.delivery_address, phone: self.phone, notes: self.notes },
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    gateway_order_id: String,
    gateway_payment_id: Option<String>,
    amount: Decimal,
    currency: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: r.id,
            order_id: r.order_id,
            gateway_order_id: r.gateway_order_id,
            gateway_payment_id: r.gateway_payment_id,
            amount: r.amount,
            currency: r.currency,
            status: r.status.parse().map_err(corrupt)?,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Writes the mutable order columns. Returns false if the order is missing.
async fn write_order_state<'e, E: PgExecutor<'e>>(exec: E, order: &Order) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $2, payment_status = $3, gateway_order_id = $4, gateway_payment_id = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(&order.gateway_order_id)
    .bind(&order.gateway_payment_id)
    .bind(order.updated_at)
    .execute(exec)
    .await
    .map_err(map_sqlx_error)?;
    Ok(result.rows_affected() > 0)
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItemRow>> {
        sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, kind, pizza_id, size_id, crust_id, topping_ids, beverage_id, title,
                   quantity, unit_price, discount, subtotal
            FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn assemble(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) = items.drain(..).partition(|i| i.order_id == row.id);
                items = rest;
                let mine = mine.into_iter().map(OrderItemRow::into_item).collect::<Result<Vec<_>>>()?;
                row.into_order(mine)
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn place_order(&self, order: &Order, cart_updated_at: DateTime<Utc>) -> Result<bool> {
        let mut tx = begin(&self.pool).await?;

        // Takes the cart row lock; a concurrent checkout of the same cart
        // waits here and then finds nothing to delete.
        let deleted = sqlx::query("DELETE FROM carts WHERE customer_id = $1 AND updated_at = $2")
            .bind(&order.customer_id)
            .bind(cart_updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if deleted.rows_affected() != 1 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, subtotal, discount, total, currency, status, payment_status,
                                delivery_address, phone, notes, gateway_order_id, gateway_payment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(order.subtotal.amount())
        .bind(order.discount.amount())
        .bind(order.total.amount())
        .bind(order.currency())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.delivery.address)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.notes)
        .bind(&order.gateway_order_id)
        .bind(&order.gateway_payment_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (position, item) in order.items.iter().enumerate() {
            let cols = LineColumns::from(&item.line);
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, kind, pizza_id, size_id, crust_id, topping_ids,
                                         beverage_id, title, quantity, unit_price, discount, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(position as i32)
            .bind(cols.kind)
            .bind(cols.pizza_id)
            .bind(cols.size_id)
            .bind(cols.crust_id)
            .bind(&cols.topping_ids)
            .bind(cols.beverage_id)
            .bind(&item.title)
            .bind(item.quantity as i32)
            .bind(item.unit_price)
            .bind(item.discount)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        match row {
            Some(r) => Ok(self.assemble(vec![r]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM orders
            WHERE ($1::text IS NULL OR customer_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.customer_id)
        .bind(status)
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR customer_id = $1) AND ($2::text IS NULL OR status = $2)",
        )
        .bind(&filter.customer_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((self.assemble(rows).await?, total.0))
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        if !write_order_state(&self.pool, order).await? {
            return Err(StoreError::not_found(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn find_payment(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn save_payment(&self, order: &Order, payment: &Payment) -> Result<()> {
        let mut tx = begin(&self.pool).await?;

        // A captured row only accepts a rewrite of the same capture, so a
        // concurrent capture or failure that read the row earlier loses.
        let written = sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, gateway_order_id, gateway_payment_id, amount, currency, status,
                                  failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (gateway_order_id) DO UPDATE SET
                gateway_payment_id = EXCLUDED.gateway_payment_id, status = EXCLUDED.status,
                failure_reason = EXCLUDED.failure_reason, updated_at = EXCLUDED.updated_at
            WHERE payments.status <> 'captured'
               OR (EXCLUDED.status = 'captured' AND payments.gateway_payment_id = EXCLUDED.gateway_payment_id)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.gateway_order_id)
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if written.rows_affected() != 1 {
            return Err(StoreError::conflict(format!(
                "gateway order {} was already captured by another payment",
                payment.gateway_order_id
            )));
        }

        if !write_order_state(&mut *tx, order).await? {
            return Err(StoreError::not_found(format!("order {}", order.id)));
        }

        tx.commit().await.map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        assert!(matches!(map_sqlx_error(sqlx::Error::RowNotFound), StoreError::NotFound(_)));
    }

    #[derive(Debug)]
    struct PgError(&'static str);

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "postgres error {}", self.0)
        }
    }

    impl std::error::Error for PgError {}

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str { "postgres error" }
        fn code(&self) -> Option<std::borrow::Cow<'_, str>> { Some(self.0.into()) }
        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) { self }
        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) { self }
        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> { self }
        fn kind(&self) -> sqlx::error::ErrorKind { sqlx::error::ErrorKind::Other }
    }

    fn db_error(code: &'static str) -> StoreError {
        map_sqlx_error(sqlx::Error::Database(Box::new(PgError(code))))
    }

    #[test]
    fn test_database_codes() {
        assert!(matches!(db_error("22003"), StoreError::Validation(_)));
        assert!(matches!(db_error("23505"), StoreError::Conflict(_)));
        assert!(matches!(db_error("40001"), StoreError::Storage(_)));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50% off "), "%50\\% off%");
        assert_eq!(like_pattern("half_and_half"), "%half\\_and\\_half%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_pool_timeout() {
        assert!(matches!(map_sqlx_error(sqlx::Error::PoolTimedOut), StoreError::Storage(_)));
    }

    #[test]
    fn test_line_columns_round_trip() {
        let line = CartLine::pizza(Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3), vec![Uuid::from_u128(4)]);
        let cols = LineColumns::from(&line);
        let back = line_from_columns(cols.kind, cols.pizza_id, cols.size_id, cols.crust_id, cols.topping_ids, cols.beverage_id).unwrap();
        assert_eq!(back, line);
    }

    #[test]
    fn test_inconsistent_line_is_rejected() {
        assert!(line_from_columns("beverage", Some(Uuid::from_u128(1)), None, None, vec![], None).is_err());
    }
}
