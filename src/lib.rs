//! Retail POS API Library
//!
//! Backend for a retail point-of-sale: inventory, invoicing with stock
//! control, returns and refunds, loyalty, and sales analytics.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod services;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

pub use handlers::AppServices;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// Handler return type: JSON envelope or a mapped `ServiceError`.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Assembles the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Products & categories
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route("/products/low-stock", get(handlers::products::low_stock))
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route(
            "/products/:id/adjust-stock",
            post(handlers::products::adjust_stock),
        )
        .route(
            "/products/:id/reconcile",
            post(handlers::products::reconcile_stock),
        )
        .route(
            "/categories",
            get(handlers::products::list_categories).post(handlers::products::create_category),
        )
        // Customers & loyalty
        .route(
            "/customers",
            get(handlers::customers::list_customers).post(handlers::customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(handlers::customers::get_customer)
                .put(handlers::customers::update_customer)
                .delete(handlers::customers::delete_customer),
        )
        .route("/customers/:id/loyalty", get(handlers::customers::loyalty))
        .route(
            "/customers/:id/loyalty/reconcile",
            post(handlers::customers::reconcile_loyalty),
        )
        // Invoices
        .route(
            "/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
        )
        .route(
            "/invoices/:id",
            get(handlers::invoices::get_invoice).delete(handlers::invoices::void_invoice),
        )
        // Returns
        .route(
            "/returns",
            get(handlers::returns::list_returns).post(handlers::returns::create_return),
        )
        .route("/returns/:id", get(handlers::returns::get_return))
        // Reports
        .route("/reports/sales", get(handlers::reports::sales))
        .route(
            "/reports/payment-methods",
            get(handlers::reports::payment_methods),
        )
        .route("/reports/products", get(handlers::reports::products))
        .route("/reports/categories", get(handlers::reports::categories))
        .route("/reports/inventory", get(handlers::reports::inventory))
        .route("/reports/customers", get(handlers::reports::customers))
        // Settings
        .route(
            "/settings",
            get(handlers::settings::list_settings).put(handlers::settings::put_setting),
        )
        .route("/settings/:key", get(handlers::settings::get_setting));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", api)
        .with_state(state)
}
