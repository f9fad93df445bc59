//! In-memory store
//!
//! Mirrors the Postgres semantics the workflow relies on: product rows carry an
//! exclusive lock held by the owning transaction, writes are staged in the
//! transaction and applied on commit, a rollback discards them.
//!
//! There is no deadlock detection. Row lock waits are bounded by a lock timeout
//! instead, so two transactions locking the same products in opposite order both
//! fail with [`StoreError::Database`] once the timeout elapses, where Postgres
//! aborts only one of them as the deadlock victim.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use shared::models::{Order, OrderItem, Product};
use shared::util::now_millis;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{NewOrder, OrderStore, ProductStockStore, StoreError, StoreResult, TransactionManager};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MemoryStore {
    products: RwLock<BTreeMap<i64, Product>>,
    orders: RwLock<BTreeMap<i64, Order>>,
    row_locks: DashMap<i64, Arc<Mutex<()>>>,
    lock_timeout: Duration,
    product_seq: AtomicI64,
    order_seq: AtomicI64,
    item_seq: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            products: RwLock::default(),
            orders: RwLock::default(),
            row_locks: DashMap::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            product_seq: AtomicI64::new(0),
            order_seq: AtomicI64::new(0),
            item_seq: AtomicI64::new(0),
        }
    }
}

/// Open transaction on a [`MemoryStore`]
#[derive(Default)]
pub struct MemoryTx {
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    stock_writes: HashMap<i64, i32>,
    orders: Vec<Order>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound how long a transaction waits for a row lock held by another
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Add a committed product
    pub fn insert_product(&self, name: &str, price: Decimal, stock: i32) -> Product {
        let now = now_millis();
        let product = Product {
            id: self.product_seq.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            price,
            stock,
            created_at: now,
            updated_at: now,
        };
        self.products.write().insert(product.id, product.clone());
        product
    }

    /// Committed product state
    pub fn product(&self, id: i64) -> Option<Product> {
        self.products.read().get(&id).cloned()
    }

    /// Number of committed orders
    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }

    async fn lock_row(&self, tx: &mut MemoryTx, id: i64) -> StoreResult<()> {
        if tx.locks.contains_key(&id) {
            return Ok(());
        }
        let row_lock = self.row_locks.entry(id).or_default().clone();
        let guard = tokio::time::timeout(self.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(product_id = id, "Row lock wait timed out");
                StoreError::Database(format!("lock timeout on product {id}"))
            })?;
        tx.locks.insert(id, guard);
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        let MemoryTx {
            locks,
            stock_writes,
            orders,
        } = tx;

        {
            let now = now_millis();
            let mut products = self.products.write();
            let mut committed = self.orders.write();
            for (id, stock) in stock_writes {
                if let Some(product) = products.get_mut(&id) {
                    product.stock = stock;
                    product.updated_at = now;
                }
            }
            for order in orders {
                committed.insert(order.id, order);
            }
        }

        drop(locks);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl ProductStockStore for MemoryStore {
    async fn lock_and_fetch(&self, tx: &mut Self::Tx, id: i64) -> StoreResult<Option<Product>> {
        if !self.products.read().contains_key(&id) {
            return Ok(None);
        }
        self.lock_row(tx, id).await?;

        let mut product = match self.products.read().get(&id) {
            Some(product) => product.clone(),
            None => return Ok(None),
        };
        if let Some(stock) = tx.stock_writes.get(&id) {
            product.stock = *stock;
        }
        Ok(Some(product))
    }

    async fn set_stock(&self, tx: &mut Self::Tx, id: i64, stock: i32) -> StoreResult<()> {
        if !self.products.read().contains_key(&id) {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        if stock < 0 {
            return Err(StoreError::Constraint(format!(
                "stock of product {id} must not be negative"
            )));
        }
        self.lock_row(tx, id).await?;
        tx.stock_writes.insert(id, stock);
        Ok(())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.products.read().values().cloned().collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, tx: &mut Self::Tx, order: &NewOrder) -> StoreResult<Order> {
        let now = now_millis();
        let order_id = self.order_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            if !self.products.read().contains_key(&item.product_id) {
                return Err(StoreError::Constraint(format!(
                    "order item references unknown product {}",
                    item.product_id
                )));
            }
            items.push(OrderItem {
                id: self.item_seq.fetch_add(1, Ordering::SeqCst) + 1,
                order_id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                subtotal: item.subtotal,
            });
        }

        let stored = Order {
            id: order_id,
            customer_name: order.customer_name.clone(),
            total_amount: order.total_amount,
            created_at: now,
            updated_at: now,
            items,
        };
        tx.orders.push(stored.clone());
        Ok(stored)
    }

    async fn fetch_with_items_and_products(&self, id: i64) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().get(&id).cloned())
    }
}
