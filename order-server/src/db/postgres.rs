//! PostgreSQL store

use async_trait::async_trait;
use shared::models::{Order, OrderItem, Product};
use shared::util::now_millis;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::{NewOrder, OrderStore, ProductStockStore, StoreError, StoreResult, TransactionManager};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool of at most `max_connections`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionManager for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl ProductStockStore for PgStore {
    async fn lock_and_fetch(&self, tx: &mut Self::Tx, id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, stock, created_at, updated_at FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(product)
    }

    async fn set_stock(&self, tx: &mut Self::Tx, id: i64, stock: i32) -> StoreResult<()> {
        let result = sqlx::query("UPDATE products SET stock = $1, updated_at = $2 WHERE id = $3")
            .bind(stock)
            .bind(now_millis())
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        Ok(())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, stock, created_at, updated_at FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, tx: &mut Self::Tx, order: &NewOrder) -> StoreResult<Order> {
        let now = now_millis();

        let (order_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO orders (customer_name, total_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING id
            "#,
        )
        .bind(&order.customer_name)
        .bind(order.total_amount)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let (item_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, subtotal, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.subtotal)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;

            items.push(OrderItem {
                id: item_id,
                order_id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                subtotal: item.subtotal,
            });
        }

        Ok(Order {
            id: order_id,
            customer_name: order.customer_name.clone(),
            total_amount: order.total_amount,
            created_at: now,
            updated_at: now,
            items,
        })
    }

    async fn fetch_with_items_and_products(&self, id: i64) -> StoreResult<Option<Order>> {
        let Some(mut order) = sqlx::query_as::<_, Order>(
            "SELECT id, customer_name, total_amount, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        order.items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name,
                   oi.quantity, oi.subtotal
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(order))
    }
}
