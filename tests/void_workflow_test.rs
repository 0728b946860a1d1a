//! Integration tests for the invoice void workflow: stock restoration,
//! loyalty reversal, and the AlreadyVoided / HasReturns preconditions.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, TestApp};
use retail_pos_api::auth::Role;
use retail_pos_api::entities::{customer, product, stock_history};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_invoice(app: &TestApp, token: &str, payload: Value) -> Value {
    let response = app
        .request(Method::POST, "/api/v1/invoices", Some(token), Some(payload))
        .await;
    expect_status(response, StatusCode::CREATED).await
}

#[tokio::test]
async fn void_restores_stock_and_reverses_loyalty() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("VOID-A", dec!(100), 10, dec!(10)).await;
    let cust = app.seed_customer("Joan").await;

    let body = create_invoice(
        &app,
        &cashier,
        json!({
            "customer_id": cust.id,
            "payment_method": "cash",
            "items": [{"product_id": prod.id, "quantity": 3}]
        }),
    )
    .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    // total 330 -> 33 points accrued
    let before = customer::Entity::find_by_id(cust.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.loyalty_points, 33);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{invoice_id}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["status"], "VOIDED");

    // Stock is back to its pre-invoice value.
    let prod_after = product::Entity::find_by_id(prod.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prod_after.stock, 10);

    // Exactly the accrued points were reversed.
    let cust_after = customer::Entity::find_by_id(cust.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cust_after.loyalty_points, 0);
    assert_eq!(cust_after.total_purchases, dec!(0));

    // The restoration is ledgered as an adjustment.
    let adjustments = stock_history::Entity::find()
        .filter(stock_history::Column::ProductId.eq(prod.id))
        .filter(stock_history::Column::Reason.eq("adjustment"))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].delta, 3);
}

#[tokio::test]
async fn second_void_attempt_is_rejected() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("VOID-B", dec!(20), 5, dec!(0)).await;

    let body = create_invoice(
        &app,
        &cashier,
        json!({
            "payment_method": "cash",
            "items": [{"product_id": prod.id, "quantity": 1}]
        }),
    )
    .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let first = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{invoice_id}"),
            Some(&manager),
            None,
        )
        .await;
    expect_status(first, StatusCode::OK).await;

    let second = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{invoice_id}"),
            Some(&manager),
            None,
        )
        .await;
    expect_status(second, StatusCode::CONFLICT).await;

    // Idempotent-rejecting: stock restored exactly once.
    let prod_after = product::Entity::find_by_id(prod.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prod_after.stock, 5);
}

#[tokio::test]
async fn invoice_with_returns_cannot_be_voided() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("VOID-C", dec!(30), 10, dec!(0)).await;

    let body = create_invoice(
        &app,
        &cashier,
        json!({
            "payment_method": "cash",
            "items": [{"product_id": prod.id, "quantity": 4}]
        }),
    )
    .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let return_response = app
        .request(
            Method::POST,
            "/api/v1/returns",
            Some(&manager),
            Some(json!({
                "invoice_id": invoice_id,
                "reason": "damaged",
                "items": [{"product_id": prod.id, "quantity": 1}]
            })),
        )
        .await;
    expect_status(return_response, StatusCode::CREATED).await;

    let void_response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{invoice_id}"),
            Some(&manager),
            None,
        )
        .await;
    expect_status(void_response, StatusCode::CONFLICT).await;
}

#[tokio::test]
async fn voiding_a_missing_invoice_is_not_found() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{}", Uuid::new_v4()),
            Some(&manager),
            None,
        )
        .await;
    expect_status(response, StatusCode::NOT_FOUND).await;
}
