#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tower::ServiceExt;

use storefront_api as api;
use storefront_api::entities::{cart_item, customer_address, payment_method, product};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DatabaseConnection>,
    pub config: api::config::AppConfig,
}

/// Builds an app over an in-memory SQLite database. The pool is capped at a
/// single connection so every query sees the same in-memory database.
pub async fn spawn_app() -> TestApp {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect to sqlite");
    api::migrator::Migrator::up(&db, None)
        .await
        .expect("run migrations");
    let db = Arc::new(db);

    let config = api::config::AppConfig {
        payment_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        ..api::config::AppConfig::default()
    };

    let (event_sender, event_rx) = api::events::channel(64);
    tokio::spawn(api::events::process_events(event_rx));

    let services = api::handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
    let state = api::AppState {
        db: db.clone(),
        config: config.clone(),
        event_sender,
        services,
    };

    let router = Router::new()
        .nest("/api/v1", api::api_v1_routes())
        .layer(axum::middleware::from_fn(
            api::middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state);

    TestApp { router, db, config }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("dispatch request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", path, Some(body)).await
    }

    /// Delivers a signed gateway webhook.
    pub async fn webhook(&self, payload: &Value) -> (StatusCode, Value) {
        let body = payload.to_string();
        let ts = Utc::now().timestamp();
        let signature = api::handlers::payment_webhooks::sign_payload(WEBHOOK_SECRET, ts, &body);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-timestamp", ts.to_string())
            .header("x-signature", signature)
            .body(Body::from(body))
            .expect("build webhook request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("dispatch webhook");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

pub async fn seed_product(app: &TestApp, sku: &str, name: &str, price_cents: i64) -> i64 {
    seed_product_with_active(app, sku, name, price_cents, true).await
}

pub async fn seed_product_with_active(
    app: &TestApp,
    sku: &str,
    name: &str,
    price_cents: i64,
    active: bool,
) -> i64 {
    let model = product::ActiveModel {
        sku: Set(sku.to_string()),
        name: Set(name.to_string()),
        price_cents: Set(price_cents),
        active: Set(active),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("seed product");
    model.id
}

pub async fn seed_address(app: &TestApp, customer_id: i64) -> i64 {
    let model = customer_address::ActiveModel {
        customer_id: Set(customer_id),
        recipient: Set("Jo Doe".to_string()),
        street: Set("1 Main St".to_string()),
        city: Set("Springfield".to_string()),
        region: Set("OR".to_string()),
        postal_code: Set("97477".to_string()),
        country: Set("US".to_string()),
        phone: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("seed address");
    model.id
}

pub async fn seed_payment_method(app: &TestApp, code: &str) -> i64 {
    let model = payment_method::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("{} payments", code)),
        active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("seed payment method");
    model.id
}

pub async fn add_cart_item(app: &TestApp, customer_id: i64, product_id: i64, quantity: i32) {
    cart_item::ActiveModel {
        customer_id: Set(customer_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("seed cart item");
}

/// Seeds a customer with an address, a payment method, and a two-line cart
/// totalling 2500 (2 x 1000 + 1 x 500). Returns (address_id,
/// payment_method_id).
pub async fn seed_ready_to_checkout(app: &TestApp, customer_id: i64) -> (i64, i64) {
    let widget = seed_product(app, &format!("WID-{customer_id}"), "Widget", 1000).await;
    let gadget = seed_product(app, &format!("GAD-{customer_id}"), "Gadget", 500).await;
    add_cart_item(app, customer_id, widget, 2).await;
    add_cart_item(app, customer_id, gadget, 1).await;

    let address_id = seed_address(app, customer_id).await;
    let payment_method_id = seed_payment_method(app, &format!("card-{customer_id}")).await;
    (address_id, payment_method_id)
}

/// Places a standard-shipping order through the API and returns its data
/// object. Panics on a non-201 response.
pub async fn place_order(app: &TestApp, customer_id: i64, address_id: i64, pm_id: i64) -> Value {
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            serde_json::json!({
                "customer_id": customer_id,
                "fulfillment_method": "standard",
                "address_id": address_id,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
    body["data"].clone()
}

pub fn today_code(sequence: u32) -> String {
    format!("ORD-{}-{:04}", Utc::now().format("%Y%m%d"), sequence)
}
