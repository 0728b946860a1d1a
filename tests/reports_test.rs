//! Report aggregator tests: bucketed sums reconcile with overall totals,
//! percentages sum to 100 when there is revenue and to 0 when there is
//! none, and voided invoices stay out unless asked for.

mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, expect_status, TestApp};
use retail_pos_api::auth::Role;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

const WINDOW: &str = "from=2020-01-01T00:00:00Z&to=2030-01-01T00:00:00Z";

async fn sale(app: &TestApp, token: &str, product_id: &Value, qty: i64, method: &str) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(token),
            Some(json!({
                "payment_method": method,
                "items": [{"product_id": product_id, "quantity": qty}]
            })),
        )
        .await;
    expect_status(response, StatusCode::CREATED).await
}

#[tokio::test]
async fn sales_summary_periods_reconcile_with_overall() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("REP-A", dec!(20), 100, dec!(5)).await;
    let prod_id = json!(prod.id);

    for qty in [1, 2, 3] {
        sale(&app, &cashier, &prod_id, qty, "cash").await;
    }

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/sales?{WINDOW}&bucket=day"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    let data = &body["data"];

    assert_eq!(data["overall"]["invoice_count"], 3);

    let period_total: Decimal = data["periods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| dec_field(&p["total_amount"]))
        .sum();
    assert_eq!(period_total, dec_field(&data["overall"]["total_amount"]));

    let period_count: i64 = data["periods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["invoice_count"].as_i64().unwrap())
        .sum();
    assert_eq!(period_count, 3);
}

#[tokio::test]
async fn payment_method_percentages_sum_to_one_hundred() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("REP-B", dec!(30), 100, dec!(0)).await;
    let prod_id = json!(prod.id);

    sale(&app, &cashier, &prod_id, 1, "cash").await;
    sale(&app, &cashier, &prod_id, 2, "card").await;
    sale(&app, &cashier, &prod_id, 3, "voucher").await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/payment-methods?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    let methods = body["data"]["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 3);

    let share_sum: Decimal = methods.iter().map(|m| dec_field(&m["percentage"])).sum();
    assert!(
        (share_sum - dec!(100)).abs() <= dec!(0.05),
        "shares must sum to ~100, got {share_sum}"
    );
}

#[tokio::test]
async fn empty_window_reports_zero_not_division_errors() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/reports/payment-methods?from=1999-01-01T00:00:00Z&to=1999-02-01T00:00:00Z",
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(dec_field(&body["data"]["total_amount"]), dec!(0));
    assert!(body["data"]["methods"].as_array().unwrap().is_empty());

    let response = app
        .request(
            Method::GET,
            "/api/v1/reports/sales?from=1999-01-01T00:00:00Z&to=1999-02-01T00:00:00Z",
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["overall"]["invoice_count"], 0);
    assert_eq!(dec_field(&body["data"]["overall"]["average_invoice"]), dec!(0));
}

#[tokio::test]
async fn voided_invoices_are_excluded_unless_requested() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("REP-V", dec!(50), 100, dec!(0)).await;
    let prod_id = json!(prod.id);

    sale(&app, &cashier, &prod_id, 1, "cash").await;
    let voided = sale(&app, &cashier, &prod_id, 1, "cash").await;
    let voided_id = voided["data"]["id"].as_str().unwrap().to_string();
    let void = app
        .request(
            Method::DELETE,
            &format!("/api/v1/invoices/{voided_id}"),
            Some(&manager),
            None,
        )
        .await;
    expect_status(void, StatusCode::OK).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/sales?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["overall"]["invoice_count"], 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/sales?{WINDOW}&include_voided=true"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["overall"]["invoice_count"], 2);
}

#[tokio::test]
async fn inventory_valuation_prices_stock_at_cost_and_retail() {
    let app = TestApp::new().await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    // seed_product sets cost = price / 2
    app.seed_product("VAL-A", dec!(10), 4, dec!(0)).await;
    app.seed_product("VAL-B", dec!(20), 0, dec!(0)).await;

    let response = app
        .request(Method::GET, "/api/v1/reports/inventory", Some(&manager), None)
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    let data = &body["data"];

    assert_eq!(data["product_count"], 2);
    assert_eq!(data["out_of_stock_count"], 1);
    assert_eq!(dec_field(&data["total_retail_value"]), dec!(40));
    assert_eq!(dec_field(&data["total_cost_value"]), dec!(20));
}

#[tokio::test]
async fn customer_report_splits_new_and_returning() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let prod = app.seed_product("REP-C", dec!(10), 100, dec!(0)).await;
    let cust = app.seed_customer("Marge").await;

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

    // Whole-history window: first purchase falls inside it, so new.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/customers?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["new_customers"], 1);
    assert_eq!(body["data"]["returning_customers"], 0);
    assert_eq!(body["data"]["customers"][0]["invoice_count"], 1);

    // Backdate the first purchase, buy again, and query a window that only
    // covers the new purchase: the customer is now returning.
    use chrono::{TimeZone, Utc};
    use retail_pos_api::entities::invoice;
    use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};

    let first = invoice::Entity::find()
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut first = first.into_active_model();
    first.created_at = Set(Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap());
    first.update(&*app.state.db).await.unwrap();

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

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/customers?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["new_customers"], 0);
    assert_eq!(body["data"]["returning_customers"], 1);
}

#[tokio::test]
async fn product_and_category_breakdowns_cover_all_revenue() {
    let app = TestApp::new().await;
    let (_, cashier) = app.seed_user(Role::Cashier).await;
    let (_, manager) = app.seed_user(Role::Manager).await;
    let a = app.seed_product("BRK-A", dec!(10), 100, dec!(0)).await;
    let b = app.seed_product("BRK-B", dec!(40), 100, dec!(0)).await;

    sale(&app, &cashier, &json!(a.id), 2, "cash").await;
    sale(&app, &cashier, &json!(b.id), 1, "cash").await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/products?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    let data = &body["data"];
    assert_eq!(dec_field(&data["total_revenue"]), dec!(60));
    let row_sum: Decimal = data["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| dec_field(&r["revenue"]))
        .sum();
    assert_eq!(row_sum, dec!(60));

    // Neither product has a category: everything lands in Uncategorized.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reports/categories?{WINDOW}"),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    let categories = body["data"]["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["category_name"], "Uncategorized");
    assert_eq!(dec_field(&categories[0]["percentage"]), dec!(100));
}
