//! Application state

use std::sync::Arc;

use crate::BoxError;
use crate::config::{Config, IdempotencyBackend};
use crate::db::{OrderStore, PgStore, ProductStockStore};
use crate::idempotency::{
    IdempotencyGate, IdempotencyStore, MemoryIdempotencyStore, PgIdempotencyStore,
};
use crate::orders::{OrderService, OrderWorkflow};
use crate::products::{CatalogService, ProductCatalog};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderService>,
    pub catalog: Arc<dyn CatalogService>,
    pub idempotency: IdempotencyGate,
}

impl AppState {
    /// Connect to Postgres, run migrations and wire the services
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
        store.migrate().await?;
        tracing::info!("Database connected and migrated");

        let idempotency_store: Arc<dyn IdempotencyStore> = match config.idempotency_backend {
            IdempotencyBackend::Postgres => Arc::new(PgIdempotencyStore::new(store.pool().clone())),
            IdempotencyBackend::Memory => Arc::new(MemoryIdempotencyStore::new()),
        };
        tracing::info!(
            backend = ?config.idempotency_backend,
            ttl_secs = config.idempotency_ttl.as_secs(),
            "Idempotency gate ready"
        );

        Ok(Self::with_store(
            Arc::new(store),
            IdempotencyGate::new(idempotency_store, config.idempotency_ttl),
        ))
    }

    /// Wire the services over any store implementation
    pub fn with_store<S>(store: Arc<S>, idempotency: IdempotencyGate) -> Self
    where
        S: ProductStockStore + OrderStore + 'static,
    {
        Self {
            orders: Arc::new(OrderWorkflow::new(store.clone())),
            catalog: Arc::new(ProductCatalog::new(store)),
            idempotency,
        }
    }
}
