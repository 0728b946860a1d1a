// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;
use uuid::Uuid;

use retail_pos_api::{
    auth::{self, Role},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{customer, product, user},
    events, AppServices, AppState,
};

const TEST_SECRET: &str = "test_secret_key_for_integration_tests_only_32chars";

/// Test harness: application state and router over a throwaway SQLite
/// database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    // Keeps the database file alive for the duration of the test
    _db_file: NamedTempFile,
}

impl TestApp {
    /// Constructs a fresh application with migrations applied.
    pub async fn new() -> Self {
        let db_file = NamedTempFile::new().expect("temp db file");
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());

        let cfg = AppConfig::new(url.clone(), TEST_SECRET.to_string(), "127.0.0.1".into(), 0);

        let pool = db::establish_connection_with_config(&DbConfig {
            url,
            max_connections: 5,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()));
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = retail_pos_api::router(state.clone());

        Self {
            router,
            state,
            _db_file: db_file,
        }
    }

    /// Inserts a staff user and returns their id plus a bearer token.
    pub async fn seed_user(&self, role: Role) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let name = format!("{role} user");
        user::ActiveModel {
            id: Set(id),
            name: Set(name.clone()),
            email: Set(format!("{id}@example.test")),
            role: Set(role.to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user");

        let token = auth::issue_token(
            id,
            &name,
            role,
            &self.state.config.jwt_secret,
            &self.state.config.jwt_issuer,
            3600,
        )
        .expect("issue token");
        (id, token)
    }

    /// Inserts a product with the given SKU, price, stock and tax rate.
    pub async fn seed_product(
        &self,
        sku: &str,
        price: Decimal,
        stock: i32,
        tax_rate: Decimal,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {sku}")),
            description: Set(None),
            category_id: Set(None),
            price: Set(price),
            cost: Set(price / Decimal::from(2)),
            tax_rate: Set(tax_rate),
            stock: Set(stock),
            min_stock: Set(0),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Inserts a customer with a zero loyalty balance.
    pub async fn seed_customer(&self, name: &str) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(None),
            phone: Set(None),
            loyalty_points: Set(0),
            total_purchases: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer")
    }

    /// Sends a request through the router, optionally authenticated.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

/// Parses a JSON field that may arrive as a string or a number into a
/// `Decimal` for scale-insensitive comparison.
pub fn dec_field(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected a decimal-like JSON value, got {other}"),
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Asserts the status and returns the parsed body.
pub async fn expect_status(response: Response, status: StatusCode) -> Value {
    let got = response.status();
    let body = response_json(response).await;
    assert_eq!(got, status, "unexpected status, body: {body}");
    body
}
