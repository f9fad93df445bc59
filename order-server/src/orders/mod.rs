//! Order workflow
//!
//! `create_order` runs as one unit of work. Per requested item, in request order:
//! lock the product row, check stock, accumulate the subtotal and write the
//! decremented stock. The order header and items are inserted last and the
//! transaction is committed. Any failure before commit rolls back everything.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::{CreateOrderRequest, MAX_ITEM_QUANTITY, Order};
use tracing::instrument;

use crate::db::{NewOrder, NewOrderItem, OrderStore, ProductStockStore};
use crate::error::{OrderError, OrderResult};

/// Order operations exposed to the HTTP layer
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Create an order atomically with its stock decrements. Not idempotent.
    async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<Order>;

    /// Committed order with items and product names
    async fn get_order(&self, id: i64) -> OrderResult<Order>;
}

pub struct OrderWorkflow<S> {
    store: Arc<S>,
}

impl<S> OrderWorkflow<S>
where
    S: ProductStockStore + OrderStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Steps 1-5: everything that happens inside the open transaction
    async fn stage(&self, tx: &mut S::Tx, request: &CreateOrderRequest) -> OrderResult<Order> {
        let mut total = Decimal::ZERO;
        let mut items = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let product = self
                .store
                .lock_and_fetch(tx, item.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(item.product_id))?;

            if item.quantity > product.stock {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }

            let subtotal = product.price * Decimal::from(item.quantity);
            total += subtotal;

            self.store
                .set_stock(tx, product.id, product.stock - item.quantity)
                .await
                .map_err(|source| OrderError::StockUpdateFailed {
                    product_id: product.id,
                    source,
                })?;

            items.push(NewOrderItem {
                product_id: product.id,
                product_name: product.name,
                quantity: item.quantity,
                subtotal,
            });
        }

        let new_order = NewOrder {
            customer_name: request.customer_name.trim().to_string(),
            total_amount: total,
            items,
        };

        self.store
            .insert(tx, &new_order)
            .await
            .map_err(OrderError::OrderPersistFailed)
    }
}

/// Structural checks that hold regardless of the caller
fn check_request(request: &CreateOrderRequest) -> OrderResult<()> {
    if request.customer_name.trim().is_empty() {
        return Err(OrderError::InvalidRequest(
            "customer_name must not be empty".to_string(),
        ));
    }
    if request.items.is_empty() {
        return Err(OrderError::InvalidRequest(
            "order must contain at least one item".to_string(),
        ));
    }
    if let Some(item) = request
        .items
        .iter()
        .find(|item| item.quantity <= 0 || item.quantity > MAX_ITEM_QUANTITY)
    {
        return Err(OrderError::InvalidRequest(format!(
            "invalid quantity {} for product {}",
            item.quantity, item.product_id
        )));
    }
    Ok(())
}

#[async_trait]
impl<S> OrderService for OrderWorkflow<S>
where
    S: ProductStockStore + OrderStore + 'static,
{
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<Order> {
        check_request(&request)?;

        let mut tx = self.store.begin().await?;

        match self.stage(&mut tx, &request).await {
            Ok(order) => {
                self.store
                    .commit(tx)
                    .await
                    .map_err(OrderError::TransactionCommitFailed)?;
                tracing::info!(
                    order_id = order.id,
                    total = %order.total_amount,
                    "Order created"
                );
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(error = %err, "Order creation aborted");
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_order(&self, id: i64) -> OrderResult<Order> {
        self.store
            .fetch_with_items_and_products(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))
    }
}
