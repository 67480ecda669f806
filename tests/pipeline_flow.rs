//! End-to-end pipeline tests against a mock accrual engine.
//!
//! Covers the full reconciliation path (register -> submit -> poll ->
//! credit -> withdraw), the retry path through engine rate limits, engine
//! invalidation, and crash recovery via the bootstrapper.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tally::adapters::{AccrualClient, MemoryStore};
use tally::domain::OrderStatus;
use tally::pipeline::{self, Pipeline, PipelineConfig, RetryPolicy};
use tally::services::{AccountService, OrderIntake};
use tally::storage::Store;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        queue_capacity: 100,
        retry: RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 0.0),
    }
}

fn accrual_client(server: &MockServer) -> AccrualClient {
    AccrualClient::new(&server.uri(), Duration::from_secs(1)).unwrap()
}

async fn wait_for_status(store: &dyn Store, number: &str, status: OrderStatus) {
    for _ in 0..300 {
        if let Some(order) = store.order(number).await.unwrap() {
            if order.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order {} never reached {}", number, status);
}

#[tokio::test]
async fn order_flows_from_registration_to_credited_balance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(body_json(json!({ "order": "12345678903" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSED",
            "accrual": 500
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), accrual_client(&server), fast_pipeline_config());
    let (handle, _workers) = pipeline.spawn();

    let intake = OrderIntake::new(store.clone(), handle);
    let accounts = AccountService::new(store.clone());
    let user = accounts.register_user("alice", "hash").await.unwrap();

    let outcome = intake.register(user.uid, "12345678903").await.unwrap();
    assert!(outcome.is_created());
    assert_eq!(outcome.order().status, OrderStatus::New);

    wait_for_status(store.as_ref(), "12345678903", OrderStatus::Processed).await;

    let order = store.order("12345678903").await.unwrap().unwrap();
    assert_eq!(order.amount, 50_000);
    assert!(order.processed_at.is_some());

    let balance = accounts.balance(user.uid).await.unwrap();
    assert_eq!(balance.current, 50_000);
    assert_eq!(balance.withdrawn, 0);

    // the credited balance is usable for withdrawals, in a separate
    // identifier namespace from orders
    let withdrawal = accounts.withdraw(user.uid, "79927398713", 30_000).await.unwrap();
    assert_eq!(withdrawal.amount, 30_000);

    let balance = accounts.balance(user.uid).await.unwrap();
    assert_eq!(balance.current, 20_000);
    assert_eq!(balance.withdrawn, 30_000);

    let orders = accounts.orders(user.uid).await.unwrap();
    assert_eq!(orders.len(), 1);
    let withdrawals = accounts.withdrawals(user.uid).await.unwrap();
    assert_eq!(withdrawals.len(), 1);
}

#[tokio::test]
async fn rate_limited_submission_retries_until_accepted() {
    let server = MockServer::start().await;
    // first submission attempt is throttled, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    // engine reports still-processing once before the terminal result
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSING"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSED",
            "accrual": 12.5
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), accrual_client(&server), fast_pipeline_config());
    let (handle, _workers) = pipeline.spawn();

    let intake = OrderIntake::new(store.clone(), handle);
    let user = store.create_user("alice", "hash").await.unwrap();
    intake.register(user.uid, "12345678903").await.unwrap();

    wait_for_status(store.as_ref(), "12345678903", OrderStatus::Processed).await;
    assert_eq!(store.balance(user.uid).await.unwrap().current, 1_250);
}

#[tokio::test]
async fn engine_invalidation_never_credits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/79927398713"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "79927398713",
            "status": "INVALID"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), accrual_client(&server), fast_pipeline_config());
    let (handle, _workers) = pipeline.spawn();

    let intake = OrderIntake::new(store.clone(), handle);
    let user = store.create_user("alice", "hash").await.unwrap();
    intake.register(user.uid, "79927398713").await.unwrap();

    wait_for_status(store.as_ref(), "79927398713", OrderStatus::Invalid).await;

    let order = store.order("79927398713").await.unwrap().unwrap();
    assert_eq!(order.amount, 0);
    assert_eq!(store.balance(user.uid).await.unwrap().current, 0);
}

#[tokio::test]
async fn bootstrapper_recovers_orders_stranded_by_a_crash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSED",
            "accrual": 7.5
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/79927398713"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "79927398713",
            "status": "PROCESSED",
            "accrual": 100
        })))
        .mount(&server)
        .await;

    // a store as a crashed process left it: one order never submitted, one
    // stuck mid-poll
    let store = Arc::new(MemoryStore::new());
    let user = store.create_user("alice", "hash").await.unwrap();
    store.register_order(user.uid, "12345678903").await.unwrap();
    store.mark_processing("12345678903").await.unwrap();
    store.register_order(user.uid, "79927398713").await.unwrap();

    let pipeline = Pipeline::new(store.clone(), accrual_client(&server), fast_pipeline_config());
    let (handle, _workers) = pipeline.spawn();

    let report = pipeline::recover(store.as_ref(), &handle).await.unwrap();
    assert_eq!(report.resubmitted, 1);
    assert_eq!(report.repolled, 1);

    wait_for_status(store.as_ref(), "12345678903", OrderStatus::Processed).await;
    wait_for_status(store.as_ref(), "79927398713", OrderStatus::Processed).await;

    // 7.5 points + 100 points, each credited exactly once
    assert_eq!(store.balance(user.uid).await.unwrap().current, 10_750);
}

#[tokio::test]
async fn duplicate_terminal_delivery_credits_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSED",
            "accrual": 500
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let user = store.create_user("alice", "hash").await.unwrap();
    store.register_order(user.uid, "12345678903").await.unwrap();
    store.mark_processing("12345678903").await.unwrap();

    let pipeline = Pipeline::new(store.clone(), accrual_client(&server), fast_pipeline_config());
    let (handle, _workers) = pipeline.spawn();

    // the same order delivered twice, as a bootstrap double-enqueue would
    handle.enqueue_status("12345678903").await.unwrap();
    handle.enqueue_status("12345678903").await.unwrap();

    wait_for_status(store.as_ref(), "12345678903", OrderStatus::Processed).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.balance(user.uid).await.unwrap().current, 50_000);
}
