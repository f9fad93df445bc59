//! End-to-end tests over the axum router with in-memory stores

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use order_server::api::create_router;
use order_server::db::{MemoryStore, ProductStockStore, TransactionManager};
use order_server::idempotency::{
    IDEMPOTENCY_HEADER, IdempotencyError, IdempotencyGate, IdempotencyRecord, IdempotencyResult,
    IdempotencyStore, MemoryIdempotencyStore,
};
use order_server::state::AppState;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::Barrier;
use tower::ServiceExt;

const TTL: Duration = Duration::from_secs(600);

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    laptop_id: i64,
    mouse_id: i64,
}

impl TestApp {
    fn new() -> (Self, Arc<MemoryIdempotencyStore>) {
        let cache = Arc::new(MemoryIdempotencyStore::new());
        (Self::with_cache(cache.clone()), cache)
    }

    fn with_cache(cache: Arc<dyn IdempotencyStore>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let laptop = store.insert_product("Laptop", Decimal::new(500, 0), 10);
        let mouse = store.insert_product("Mouse", Decimal::new(25, 0), 2);
        let state = AppState::with_store(store.clone(), IdempotencyGate::new(cache, TTL));

        Self {
            router: create_router(state),
            store,
            laptop_id: laptop.id,
            mouse_id: mouse.id,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn stock(&self, id: i64) -> i32 {
        self.store.product(id).unwrap().stock
    }
}

fn create_order(body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/orders").header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(IDEMPOTENCY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn order_body(items: &[(i64, i32)]) -> Value {
    json!({
        "customer_name": "Ana",
        "items": items
            .iter()
            .map(|(product_id, quantity)| json!({"product_id": product_id, "quantity": quantity}))
            .collect::<Vec<_>>(),
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Idempotency store that is always down
struct UnreachableStore;

#[async_trait]
impl IdempotencyStore for UnreachableStore {
    async fn get(&self, _key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        Err(IdempotencyError::Backend("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _record: &IdempotencyRecord,
        _ttl: Duration,
    ) -> IdempotencyResult<()> {
        Err(IdempotencyError::Backend("connection refused".into()))
    }

    async fn evict_expired(&self) -> IdempotencyResult<u64> {
        Ok(0)
    }
}

/// Get-then-set store whose first reads wait for each other after reading
struct RacyStore {
    inner: MemoryIdempotencyStore,
    barrier: Barrier,
    gated: AtomicUsize,
}

#[async_trait]
impl IdempotencyStore for RacyStore {
    async fn get(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let record = self.inner.get(key).await?;
        if self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.barrier.wait().await;
        }
        Ok(record)
    }

    async fn set(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<()> {
        self.inner.set(key, record, ttl).await
    }

    async fn evict_expired(&self) -> IdempotencyResult<u64> {
        self.inner.evict_expired().await
    }
}

// ========== Order workflow over HTTP ==========

#[tokio::test]
async fn test_create_and_fetch_order() {
    let (app, _) = TestApp::new();

    let (status, body) = app
        .send_json(create_order(order_body(&[(app.laptop_id, 2)]), None))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["customer_name"], "Ana");
    assert_eq!(body["data"]["total_amount"], json!(1000.0));
    assert_eq!(app.stock(app.laptop_id), 8);

    let id = body["data"]["id"].as_i64().unwrap();
    let (status, order) = app.send_json(get(&format!("/api/orders/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], id);
    assert_eq!(order["total_amount"], json!(1000.0));
    assert_eq!(order["items"][0]["product_id"], app.laptop_id);
    assert_eq!(order["items"][0]["product_name"], "Laptop");
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["items"][0]["subtotal"], json!(1000.0));

    let (status, products) = app.send_json(get("/api/products")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(products[0]["stock"], 8);
}

#[tokio::test]
async fn test_insufficient_stock() {
    let (app, _) = TestApp::new();

    let (status, body) = app
        .send_json(create_order(order_body(&[(app.mouse_id, 5)]), None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 6003);
    assert_eq!(body["details"]["available"], 2);
    assert_eq!(app.stock(app.mouse_id), 2);
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_unknown_product_aborts_whole_order() {
    let (app, _) = TestApp::new();

    let (status, body) = app
        .send_json(create_order(
            order_body(&[(app.laptop_id, 1), (app.mouse_id, 1), (999, 1)]),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 6001);
    assert_eq!(app.stock(app.laptop_id), 10);
    assert_eq!(app.stock(app.mouse_id), 2);
    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_get_order_errors() {
    let (app, _) = TestApp::new();

    let (status, body) = app.send_json(get("/api/orders/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4001);

    let (status, _) = app.send_json(get("/api/orders/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send_json(get("/api/orders/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);
}

#[tokio::test]
async fn test_request_validation() {
    let (app, _) = TestApp::new();

    let (status, body) = app.send_json(create_order(order_body(&[]), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);

    let (status, body) = app
        .send_json(create_order(order_body(&[(app.laptop_id, 0)]), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);

    let malformed = Request::post("/api/orders")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send_json(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    assert_eq!(app.stock(app.laptop_id), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_do_not_oversell() {
    let (app, _) = TestApp::new();
    let body = order_body(&[(app.laptop_id, 6)]);

    let (first, second) = tokio::join!(
        app.send(create_order(body.clone(), None)),
        app.send(create_order(body.clone(), None)),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(app.stock(app.laptop_id), 4);
    assert_eq!(app.store.order_count(), 1);
}

// ========== Idempotency ==========

#[tokio::test]
async fn test_replay_returns_identical_bytes() {
    let (app, _) = TestApp::new();
    let body = order_body(&[(app.laptop_id, 2)]);

    let (first_status, first_body) = app.send(create_order(body.clone(), Some("order-1"))).await;
    let (second_status, second_body) = app.send(create_order(body.clone(), Some("order-1"))).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first_body, second_body);
    assert_eq!(app.store.order_count(), 1);
    assert_eq!(app.stock(app.laptop_id), 8);
}

#[tokio::test]
async fn test_replay_keeps_content_type() {
    let (app, _) = TestApp::new();
    let body = order_body(&[(app.laptop_id, 1)]);

    app.send(create_order(body.clone(), Some("ct"))).await;
    let response = app
        .router
        .clone()
        .oneshot(create_order(body, Some("ct")))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_distinct_keys_create_distinct_orders() {
    let (app, _) = TestApp::new();
    let body = order_body(&[(app.laptop_id, 1)]);

    app.send(create_order(body.clone(), Some("a"))).await;
    app.send(create_order(body.clone(), Some("b"))).await;
    app.send(create_order(body.clone(), None)).await;
    app.send(create_order(body, Some(""))).await;

    assert_eq!(app.store.order_count(), 4);
    assert_eq!(app.stock(app.laptop_id), 6);
}

#[tokio::test]
async fn test_in_flight_duplicate_gets_conflict() {
    let (app, cache) = TestApp::new();
    let body = order_body(&[(app.laptop_id, 2)]);

    // Hold the product row so the first request stalls inside its transaction
    let mut blocker = app.store.begin().await.unwrap();
    app.store
        .lock_and_fetch(&mut blocker, app.laptop_id)
        .await
        .unwrap();

    let first = tokio::spawn(
        app.router
            .clone()
            .oneshot(create_order(body.clone(), Some("slow"))),
    );

    let mut claimed = false;
    for _ in 0..200 {
        if cache.get("idempotency:slow").await.unwrap().is_some() {
            claimed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(claimed, "first request never claimed the key");

    let (status, dup) = app.send_json(create_order(body, Some("slow"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dup["code"], 4009);

    app.store.rollback(blocker).await.unwrap();
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.store.order_count(), 1);
    assert_eq!(app.stock(app.laptop_id), 8);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_blocks_key_until_expiry() {
    let (app, _) = TestApp::new();
    let body = order_body(&[(app.mouse_id, 3)]);

    let (status, _) = app.send(create_order(body.clone(), Some("retry"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Restock, then retry with the same key: still held
    let restock = Request::put(format!("/api/products/{}/stock", app.mouse_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"stock": 10}).to_string()))
        .unwrap();
    let (status, _) = app.send(restock).await;
    assert_eq!(status, StatusCode::OK);

    let (status, retry) = app.send_json(create_order(body.clone(), Some("retry"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(retry["code"], 4009);
    assert_eq!(app.store.order_count(), 0);

    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let (status, _) = app.send(create_order(body, Some("retry"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.stock(app.mouse_id), 7);
}

#[tokio::test]
async fn test_cache_outage_fails_open() {
    let app = TestApp::with_cache(Arc::new(UnreachableStore));
    let body = order_body(&[(app.laptop_id, 1)]);

    let (first, _) = app.send(create_order(body.clone(), Some("k"))).await;
    let (second, _) = app.send(create_order(body, Some("k"))).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CREATED);
    assert_eq!(app.store.order_count(), 2);
}

#[tokio::test]
async fn test_non_atomic_cache_admits_concurrent_duplicates() {
    let app = TestApp::with_cache(Arc::new(RacyStore {
        inner: MemoryIdempotencyStore::new(),
        barrier: Barrier::new(2),
        gated: AtomicUsize::new(4),
    }));
    let body = order_body(&[(app.laptop_id, 2)]);

    let (first, second) = tokio::join!(
        app.send(create_order(body.clone(), Some("dup"))),
        app.send(create_order(body.clone(), Some("dup"))),
    );

    assert_eq!(first.0, StatusCode::CREATED);
    assert_eq!(second.0, StatusCode::CREATED);
    assert_eq!(app.store.order_count(), 2);
    assert_eq!(app.stock(app.laptop_id), 6);
}

// ========== Products & health ==========

#[tokio::test]
async fn test_update_stock_endpoint() {
    let (app, _) = TestApp::new();

    let put = |id: i64, stock: i32| {
        Request::put(format!("/api/products/{id}/stock"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "stock": stock }).to_string()))
            .unwrap()
    };

    let (status, body) = app.send_json(put(app.laptop_id, 20)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stock"], 20);
    assert_eq!(app.stock(app.laptop_id), 20);

    let (status, body) = app.send_json(put(app.laptop_id, -1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);

    let (status, body) = app.send_json(put(404, 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 6001);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = TestApp::new();
    let (status, body) = app.send_json(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
