//! Role contract tests: every endpoint enforces its role floor through the
//! single policy-evaluation point, and unauthenticated requests are 401.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, TestApp};
use retail_pos_api::auth::Role;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn missing_or_garbage_tokens_are_unauthorized() {
    let app = TestApp::new().await;

    let no_token = app
        .request(Method::GET, "/api/v1/products", None, None)
        .await;
    expect_status(no_token, StatusCode::UNAUTHORIZED).await;

    let garbage = app
        .request(
            Method::GET,
            "/api/v1/products",
            Some("not-a-real-token"),
            None,
        )
        .await;
    expect_status(garbage, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn cashier_cannot_void_create_products_or_read_reports() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let prod = app.seed_product("RBAC-A", dec!(10), 5, dec!(0)).await;

    let void = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{}", uuid::Uuid::new_v4()),
            Some(&cashier),
            None,
        )
        .await;
    expect_status(void, StatusCode::FORBIDDEN).await;

    let create_product = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&cashier),
            Some(json!({"sku": "NEW-1", "name": "New", "price": "5.00"})),
        )
        .await;
    expect_status(create_product, StatusCode::FORBIDDEN).await;

    let adjust = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/adjust-stock", prod.id),
            Some(&cashier),
            Some(json!({"delta": 5, "reason": "purchase"})),
        )
        .await;
    expect_status(adjust, StatusCode::FORBIDDEN).await;

    let report = app
        .request(
            Method::GET,
            "/api/v1/reports/sales?from=2026-01-01T00:00:00Z&to=2026-02-01T00:00:00Z",
            Some(&cashier),
            None,
        )
        .await;
    expect_status(report, StatusCode::FORBIDDEN).await;

    let create_return = app
        .request(
            Method::POST,
            "/api/v1/returns",
            Some(&cashier),
            Some(json!({
                "invoice_id": uuid::Uuid::new_v4(),
                "reason": "nope",
                "items": [{"product_id": prod.id, "quantity": 1}]
            })),
        )
        .await;
    expect_status(create_return, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn cashier_can_sell_and_browse() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let prod = app.seed_product("RBAC-B", dec!(10), 5, dec!(0)).await;

    let list = app
        .request(Method::GET, "/api/v1/products", Some(&cashier), None)
        .await;
    expect_status(list, StatusCode::OK).await;

    let sale = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(&cashier),
            Some(json!({
                "payment_method": "cash",
                "items": [{"product_id": prod.id, "quantity": 1}]
            })),
        )
        .await;
    expect_status(sale, StatusCode::CREATED).await;
}

#[tokio::test]
async fn manager_reads_reports_but_cannot_write_settings() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;

    let report = app
        .request(
            Method::GET,
            "/api/v1/reports/sales?from=2026-01-01T00:00:00Z&to=2026-02-01T00:00:00Z",
            Some(&manager),
            None,
        )
        .await;
    expect_status(report, StatusCode::OK).await;

    let settings = app
        .request(Method::GET, "/api/v1/settings", Some(&manager), None)
        .await;
    expect_status(settings, StatusCode::OK).await;

    let write = app
        .request(
            Method::PUT,
            "/api/v1/settings",
            Some(&manager),
            Some(json!({"key": "store_name", "value": "Main St"})),
        )
        .await;
    expect_status(write, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn admin_writes_settings_round_trip() {
    let app = TestApp::new().await;
    let (_, admin) = app.seed_user(Role::Admin).await;

    let write = app
        .request(
            Method::PUT,
            "/api/v1/settings",
            Some(&admin),
            Some(json!({"key": "store_name", "value": "Main St"})),
        )
        .await;
    expect_status(write, StatusCode::OK).await;

    let read = app
        .request(Method::GET, "/api/v1/settings/store_name", Some(&admin), None)
        .await;
    let body = expect_status(read, StatusCode::OK).await;
    assert_eq!(body["data"]["value"], "Main St");

    // Overwrite wins.
    let overwrite = app
        .request(
            Method::PUT,
            "/api/v1/settings",
            Some(&admin),
            Some(json!({"key": "store_name", "value": "Harbor Rd"})),
        )
        .await;
    expect_status(overwrite, StatusCode::OK).await;

    let read = app
        .request(Method::GET, "/api/v1/settings/store_name", Some(&admin), None)
        .await;
    let body = expect_status(read, StatusCode::OK).await;
    assert_eq!(body["data"]["value"], "Harbor Rd");
}
