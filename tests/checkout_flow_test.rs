//! Integration tests for the checkout flow.
//!
//! Tests cover:
//! - Cart → order conversion with server-side totals
//! - Order code assignment and same-day sequencing
//! - Cart purge semantics (exactly once, only on commit)
//! - Fulfillment method / address / payment method validation
//! - Order reads by id, code, and paged listing

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::*;

#[tokio::test]
async fn checkout_converts_cart_into_an_order() {
    let app = spawn_app().await;
    let (address_id, pm_id) = seed_ready_to_checkout(&app, 1).await;

    let order = place_order(&app, 1, address_id, pm_id).await;

    assert_eq!(order["order_code"], today_code(1));
    assert_eq!(order["customer_id"], 1);
    assert_eq!(order["subtotal_cents"], 2500);
    assert_eq!(order["shipping_cents"], 0);
    assert_eq!(order["tax_cents"], 0);
    assert_eq!(order["total_cents"], 2500);
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["shipment_status"], "preparing");

    let items = order["items"].as_array().expect("items array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_name"], "Widget");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["unit_price_cents"], 1000);
    assert_eq!(items[0]["total_cents"], 2000);
    assert_eq!(items[1]["product_name"], "Gadget");
    assert_eq!(items[1]["total_cents"], 500);
}

#[tokio::test]
async fn checkout_purges_the_cart_exactly_once() {
    let app = spawn_app().await;
    let (address_id, pm_id) = seed_ready_to_checkout(&app, 1).await;

    place_order(&app, 1, address_id, pm_id).await;

    // The cart was consumed by the first checkout, so a retry has nothing
    // left to convert.
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 1,
                "fulfillment_method": "standard",
                "address_id": address_id,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn same_day_orders_get_sequential_codes() {
    let app = spawn_app().await;
    let (addr1, pm1) = seed_ready_to_checkout(&app, 1).await;
    let (addr2, pm2) = seed_ready_to_checkout(&app, 2).await;

    let first = place_order(&app, 1, addr1, pm1).await;
    let second = place_order(&app, 2, addr2, pm2).await;

    assert_eq!(first["order_code"], today_code(1));
    assert_eq!(second["order_code"], today_code(2));
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = spawn_app().await;
    let address_id = seed_address(&app, 9).await;
    let pm_id = seed_payment_method(&app, "card").await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 9,
                "fulfillment_method": "standard",
                "address_id": address_id,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn pickup_orders_need_no_address() {
    let app = spawn_app().await;
    let product = seed_product(&app, "SKU-1", "Thing", 750).await;
    add_cart_item(&app, 3, product, 1).await;
    let pm_id = seed_payment_method(&app, "card").await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 3,
                "fulfillment_method": "pickup",
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
    assert_eq!(body["data"]["address_id"], serde_json::Value::Null);
    assert_eq!(body["data"]["shipping_cents"], 0);
    assert_eq!(body["data"]["total_cents"], 750);
}

#[tokio::test]
async fn delivery_without_address_is_rejected() {
    let app = spawn_app().await;
    let product = seed_product(&app, "SKU-1", "Thing", 750).await;
    add_cart_item(&app, 3, product, 1).await;
    let pm_id = seed_payment_method(&app, "card").await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 3,
                "fulfillment_method": "standard",
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("requires a shipping address"));
}

#[tokio::test]
async fn express_shipping_adds_the_flat_fee() {
    let app = spawn_app().await;
    let (address_id, pm_id) = seed_ready_to_checkout(&app, 1).await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 1,
                "fulfillment_method": "express",
                "address_id": address_id,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
    assert_eq!(body["data"]["subtotal_cents"], 2500);
    assert_eq!(body["data"]["shipping_cents"], 999);
    assert_eq!(body["data"]["total_cents"], 3499);
}

#[tokio::test]
async fn another_customers_address_is_rejected() {
    let app = spawn_app().await;
    let (_, pm_id) = seed_ready_to_checkout(&app, 1).await;
    let foreign_address = seed_address(&app, 2).await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 1,
                "fulfillment_method": "standard",
                "address_id": foreign_address,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("does not exist for this customer"));
}

#[tokio::test]
async fn deactivated_product_blocks_checkout_and_keeps_the_cart() {
    let app = spawn_app().await;
    let retired = seed_product_with_active(&app, "OLD-1", "Retired", 100, false).await;
    add_cart_item(&app, 5, retired, 1).await;
    let address_id = seed_address(&app, 5).await;
    let pm_id = seed_payment_method(&app, "card").await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 5,
                "fulfillment_method": "standard",
                "address_id": address_id,
                "payment_method_id": pm_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("no longer available"));

    // Nothing was committed, so the cart rows survive the failed attempt.
    use sea_orm::EntityTrait;
    let remaining = storefront_api::entities::CartItem::find()
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let app = spawn_app().await;
    let (address_id, _) = seed_ready_to_checkout(&app, 1).await;

    let (status, body) = app
        .post(
            "/api/v1/checkout",
            json!({
                "customer_id": 1,
                "fulfillment_method": "standard",
                "address_id": address_id,
                "payment_method_id": 404,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("does not exist or is inactive"));
}

#[tokio::test]
async fn orders_are_readable_by_id_code_and_listing() {
    let app = spawn_app().await;
    let (addr1, pm1) = seed_ready_to_checkout(&app, 1).await;
    let (addr2, pm2) = seed_ready_to_checkout(&app, 2).await;
    let first = place_order(&app, 1, addr1, pm1).await;
    place_order(&app, 2, addr2, pm2).await;

    let id = first["id"].as_i64().unwrap();
    let code = first["order_code"].as_str().unwrap();

    let (status, body) = app.get(&format!("/api/v1/orders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order_code"], code);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (status, body) = app.get(&format!("/api/v1/orders/by-code/{code}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);

    let (status, body) = app.get(&format!("/api/v1/orders/{id}/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app.get("/api/v1/orders?customer_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["customer_id"], 1);

    let (status, body) = app.get("/api/v1/orders?page=1&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["total_pages"], 2);
}

#[tokio::test]
async fn missing_orders_return_404() {
    let app = spawn_app().await;

    let (status, _) = app.get("/api/v1/orders/41").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/api/v1/orders/by-code/ORD-19700101-0001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/api/v1/orders/41/items").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
