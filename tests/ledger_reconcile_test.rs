//! Ledger invariants: the stock ledger reconciles with on-hand stock
//! through arbitrary workflows, and the loyalty balance is rebuildable
//! from its ledger.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, TestApp};
use retail_pos_api::auth::Role;
use retail_pos_api::entities::customer;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;

#[tokio::test]
async fn stock_ledger_reconciles_through_sale_return_and_adjustment() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;

    // Create the product through the API so opening stock is ledgered.
    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&manager),
            Some(json!({
                "sku": "LED-1",
                "name": "Ledgered",
                "price": "10.00",
                "stock": 10
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    // Sale of 4.
    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(&cashier),
            Some(json!({
                "payment_method": "cash",
                "items": [{"product_id": product_id, "quantity": 4}]
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    // Return 1.
    let response = app
        .request(
            Method::POST,
            "/api/v1/returns",
            Some(&manager),
            Some(json!({
                "invoice_id": invoice_id,
                "reason": "damaged",
                "items": [{"product_id": product_id, "quantity": 1}]
            })),
        )
        .await;
    expect_status(response, StatusCode::CREATED).await;

    // Manual restock of 5.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{product_id}/adjust-stock"),
            Some(&manager),
            Some(json!({"delta": 5, "reason": "purchase"})),
        )
        .await;
    expect_status(response, StatusCode::OK).await;

    // 10 - 4 + 1 + 5 = 12, and the ledger agrees with the stored stock.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{product_id}/reconcile"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["stock"], 12);
    assert_eq!(body["data"]["ledger_sum"], 12);
    assert_eq!(body["data"]["drift"], 0);
    assert_eq!(body["data"]["repaired"], false);
}

#[tokio::test]
async fn stock_adjustment_below_zero_is_rejected() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("LED-2", dec!(10), 3, dec!(0)).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/adjust-stock", prod.id),
            Some(&manager),
            Some(json!({"delta": -5, "reason": "adjustment"})),
        )
        .await;
    expect_status(response, StatusCode::CONFLICT).await;

    // Removing what is actually there works.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/adjust-stock", prod.id),
            Some(&manager),
            Some(json!({"delta": -3, "reason": "adjustment", "note": "shrinkage"})),
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["stock"], 0);
}

#[tokio::test]
async fn sale_reasons_are_not_allowed_for_manual_adjustments() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("LED-3", dec!(10), 3, dec!(0)).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/adjust-stock", prod.id),
            Some(&manager),
            Some(json!({"delta": -1, "reason": "sale"})),
        )
        .await;
    expect_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn loyalty_drift_is_detected_and_repaired_from_the_ledger() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("LED-4", dec!(100), 10, dec!(0)).await;
    let cust = app.seed_customer("Drifty").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(&cashier),
            Some(json!({
                "customer_id": cust.id,
                "payment_method": "cash",
                "items": [{"product_id": prod.id, "quantity": 1}]
            })),
        )
        .await;
    expect_status(response, StatusCode::CREATED).await;

    // Corrupt the materialized balance behind the ledger's back.
    let stored = customer::Entity::find_by_id(cust.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: customer::ActiveModel = stored.into();
    active.loyalty_points = Set(999);
    active.update(&*app.state.db).await.unwrap();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{}/loyalty", cust.id),
            Some(&cashier),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["balance"]["in_sync"], false);
    assert_eq!(body["data"]["balance"]["ledger_points"], 10);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{}/loyalty/reconcile", cust.id),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["loyalty_points"], 10);
    assert_eq!(body["data"]["in_sync"], true);
}

#[tokio::test]
async fn activity_log_records_every_mutating_workflow() {
    let app = TestApp::new().await;
    let (cashier_id, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("LED-5", dec!(10), 10, dec!(0)).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(&cashier),
            Some(json!({
                "payment_method": "cash",
                "items": [{"product_id": prod.id, "quantity": 2}]
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/returns",
            Some(&manager),
            Some(json!({
                "invoice_id": invoice_id,
                "reason": "damaged",
                "items": [{"product_id": prod.id, "quantity": 2}]
            })),
        )
        .await;
    expect_status(response, StatusCode::CREATED).await;

    use retail_pos_api::entities::activity_log;
    use sea_orm::{ColumnTrait, QueryFilter};

    let entries = activity_log::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"invoice.create"));
    assert!(actions.contains(&"return.create"));

    let by_cashier = activity_log::Entity::find()
        .filter(activity_log::Column::UserId.eq(cashier_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(by_cashier.len(), 1);
    assert_eq!(by_cashier[0].action, "invoice.create");
}
