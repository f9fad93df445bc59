//! Product catalog operations

use std::sync::Arc;

use async_trait::async_trait;
use shared::models::Product;
use tracing::instrument;

use crate::db::ProductStockStore;
use crate::error::{OrderError, OrderResult};

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn list_products(&self) -> OrderResult<Vec<Product>>;

    /// Overwrite the stock of one product in its own transaction
    async fn update_stock(&self, id: i64, stock: i32) -> OrderResult<Product>;
}

pub struct ProductCatalog<S> {
    store: Arc<S>,
}

impl<S: ProductStockStore> ProductCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> CatalogService for ProductCatalog<S>
where
    S: ProductStockStore + 'static,
{
    async fn list_products(&self) -> OrderResult<Vec<Product>> {
        Ok(self.store.list_products().await?)
    }

    #[instrument(skip(self))]
    async fn update_stock(&self, id: i64, stock: i32) -> OrderResult<Product> {
        if stock < 0 {
            return Err(OrderError::Validation("stock must not be negative".to_string()));
        }

        let mut tx = self.store.begin().await?;

        let staged = async {
            let mut product = self
                .store
                .lock_and_fetch(&mut tx, id)
                .await?
                .ok_or(OrderError::ProductNotFound(id))?;
            self.store
                .set_stock(&mut tx, id, stock)
                .await
                .map_err(|source| OrderError::StockUpdateFailed {
                    product_id: id,
                    source,
                })?;
            product.stock = stock;
            Ok::<_, OrderError>(product)
        }
        .await;

        match staged {
            Ok(product) => {
                self.store
                    .commit(tx)
                    .await
                    .map_err(OrderError::TransactionCommitFailed)?;
                tracing::info!(product_id = id, stock, "Stock updated");
                Ok(product)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_update_stock() {
        let store = Arc::new(MemoryStore::new());
        let laptop = store.insert_product("Laptop", Decimal::new(500, 0), 10);
        let catalog = ProductCatalog::new(store.clone());

        let updated = catalog.update_stock(laptop.id, 25).await.unwrap();
        assert_eq!(updated.stock, 25);
        assert_eq!(store.product(laptop.id).unwrap().stock, 25);
    }

    #[tokio::test]
    async fn test_update_stock_rejects_bad_input() {
        let store = Arc::new(MemoryStore::new());
        let laptop = store.insert_product("Laptop", Decimal::new(500, 0), 10);
        let catalog = ProductCatalog::new(store.clone());

        assert!(matches!(
            catalog.update_stock(laptop.id, -1).await.unwrap_err(),
            OrderError::Validation(_)
        ));
        assert!(matches!(
            catalog.update_stock(404, 1).await.unwrap_err(),
            OrderError::ProductNotFound(404)
        ));
        assert_eq!(store.product(laptop.id).unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_list_products_ordered_by_id() {
        let store = Arc::new(MemoryStore::new());
        store.insert_product("Laptop", Decimal::new(500, 0), 10);
        store.insert_product("Mouse", Decimal::new(25, 0), 3);
        let catalog = ProductCatalog::new(store);

        let products = catalog.list_products().await.unwrap();
        let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Laptop", "Mouse"]);
    }
}
