use crate::{
    db::DbPool,
    entities::{category, invoice_item, product, stock_history},
    errors::ServiceError,
    events::{Event, EventSender},
    models::StockReason,
    services::audit,
    services::invoices::record_stock_delta,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64, message = "SKU must be between 1 and 64 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub price: Decimal,
    #[serde(default)]
    pub cost: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    /// Opening stock; recorded as a `purchase` ledger entry when positive
    #[serde(default)]
    #[validate(range(min = 0, message = "Opening stock must not be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub min_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub min_stock: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed quantity change; positive restocks, negative removes
    pub delta: i32,
    /// `purchase` for received goods, `adjustment` for corrections
    pub reason: StockReason,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
}

/// Outcome of comparing a product's stock against its ledger sum.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockReconciliation {
    pub product_id: Uuid,
    pub stock: i32,
    pub ledger_sum: i64,
    pub drift: i64,
    pub repaired: bool,
}

/// Service for product and category management and manual stock movements.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send domain event");
            }
        }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku, user_id = %user_id))]
    pub async fn create_product(
        &self,
        user_id: Uuid,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.price < Decimal::ZERO || request.cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price and cost must not be negative".to_string(),
            ));
        }

        let db = self.db_pool.clone();
        let req = request.clone();

        let saved = db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let taken = product::Entity::find()
                        .filter(product::Column::Sku.eq(req.sku.clone()))
                        .count(txn)
                        .await?;
                    if taken > 0 {
                        return Err(ServiceError::Conflict(format!(
                            "SKU {} already exists",
                            req.sku
                        )));
                    }

                    if let Some(category_id) = req.category_id {
                        category::Entity::find_by_id(category_id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Category {category_id} not found"
                                ))
                            })?;
                    }

                    let now = Utc::now();
                    let product_id = Uuid::new_v4();
                    let saved = product::ActiveModel {
                        id: Set(product_id),
                        sku: Set(req.sku.clone()),
                        name: Set(req.name.clone()),
                        description: Set(req.description.clone()),
                        category_id: Set(req.category_id),
                        price: Set(req.price),
                        cost: Set(req.cost),
                        tax_rate: Set(req.tax_rate),
                        stock: Set(req.stock),
                        min_stock: Set(req.min_stock),
                        active: Set(true),
                        created_at: Set(now),
                        updated_at: Set(Some(now)),
                    }
                    .insert(txn)
                    .await?;

                    if req.stock > 0 {
                        record_stock_delta(
                            txn,
                            product_id,
                            req.stock,
                            StockReason::Purchase,
                            req.stock,
                            None,
                            None,
                            Some(user_id),
                            Some("opening stock".to_string()),
                        )
                        .await?;
                    }

                    audit::log_activity(
                        txn,
                        user_id,
                        "product.create",
                        "product",
                        product_id,
                        Some(serde_json::json!({ "sku": saved.sku.clone() })),
                    )
                    .await?;

                    Ok(saved)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(product_id = %saved.id, sku = %saved.sku, "product created");
        self.emit(Event::ProductCreated(saved.id)).await;
        Ok(saved)
    }

    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let existing = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        if let Some(category_id) = request.category_id {
            category::Entity::find_by_id(category_id)
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category {category_id} not found"))
                })?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(category_id) = request.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(price) = request.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price must not be negative".to_string(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(cost) = request.cost {
            active.cost = Set(cost);
        }
        if let Some(tax_rate) = request.tax_rate {
            active.tax_rate = Set(tax_rate);
        }
        if let Some(min_stock) = request.min_stock {
            active.min_stock = Set(min_stock);
        }
        if let Some(is_active) = request.active {
            active.active = Set(is_active);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await?;

        audit::log_activity(db, user_id, "product.update", "product", product_id, None).await?;

        Ok(updated)
    }

    /// Deletes a product outright when nothing references it; products with
    /// sales or ledger history are deactivated instead so history stays
    /// reconcilable.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let referenced = invoice_item::Entity::find()
            .filter(invoice_item::Column::ProductId.eq(product_id))
            .count(db)
            .await?
            + stock_history::Entity::find()
                .filter(stock_history::Column::ProductId.eq(product_id))
                .count(db)
                .await?;

        if referenced > 0 {
            let mut active: product::ActiveModel = existing.into();
            active.active = Set(false);
            active.updated_at = Set(Some(Utc::now()));
            active.update(db).await?;
            info!(product_id = %product_id, "product deactivated (has history)");
        } else {
            product::Entity::delete_by_id(product_id).exec(db).await?;
            info!(product_id = %product_id, "product deleted");
        }

        audit::log_activity(db, user_id, "product.delete", "product", product_id, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(product::Entity::find_by_id(product_id).one(db).await?)
    }

    /// Lists products with pagination and optional name/SKU search.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
        search: Option<String>,
        include_inactive: bool,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = product::Entity::find().order_by_asc(product::Column::Name);
        if !include_inactive {
            query = query.filter(product::Column::Active.eq(true));
        }
        if let Some(needle) = search.filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", needle.trim());
            query = query.filter(
                product::Column::Name
                    .like(pattern.clone())
                    .or(product::Column::Sku.like(pattern)),
            );
        }

        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    /// Products at or below their minimum stock level.
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<product::Model>, ServiceError> {
        let db = &*self.db_pool;
        let products = product::Entity::find()
            .filter(product::Column::Active.eq(true))
            .filter(Expr::col(product::Column::Stock).lte(Expr::col(product::Column::MinStock)))
            .order_by_asc(product::Column::Stock)
            .all(db)
            .await?;
        Ok(products)
    }

    /// Manual stock movement with ledger entry and audit trail. Negative
    /// deltas are guarded so stock can never go below zero.
    #[instrument(skip(self, request), fields(product_id = %product_id, user_id = %user_id))]
    pub async fn adjust_stock(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        request: AdjustStockRequest,
    ) -> Result<product::Model, ServiceError> {
        if request.delta == 0 {
            return Err(ServiceError::ValidationError(
                "Stock adjustment delta must not be zero".to_string(),
            ));
        }
        if !matches!(request.reason, StockReason::Purchase | StockReason::Adjustment) {
            return Err(ServiceError::ValidationError(
                "Manual stock movements must use reason purchase or adjustment".to_string(),
            ));
        }

        let db = self.db_pool.clone();
        let req = request.clone();

        let updated = db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut update = product::Entity::update_many()
                        .col_expr(
                            product::Column::Stock,
                            Expr::col(product::Column::Stock).add(req.delta),
                        )
                        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                        .filter(product::Column::Id.eq(product_id));
                    if req.delta < 0 {
                        update = update.filter(product::Column::Stock.gte(-req.delta));
                    }
                    let result = update.exec(txn).await?;

                    if result.rows_affected == 0 {
                        // Either the product is missing or the decrement
                        // would go negative; tell them apart.
                        let exists = product::Entity::find_by_id(product_id)
                            .one(txn)
                            .await?
                            .is_some();
                        return Err(if exists {
                            ServiceError::InsufficientStock(format!(
                                "Adjustment would drive product {product_id} below zero"
                            ))
                        } else {
                            ServiceError::NotFound(format!("Product {product_id} not found"))
                        });
                    }

                    let product = product::Entity::find_by_id(product_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Product {product_id} not found"))
                        })?;

                    record_stock_delta(
                        txn,
                        product_id,
                        req.delta,
                        req.reason,
                        product.stock,
                        None,
                        None,
                        Some(user_id),
                        req.note.clone(),
                    )
                    .await?;

                    audit::log_activity(
                        txn,
                        user_id,
                        "product.adjust_stock",
                        "product",
                        product_id,
                        Some(serde_json::json!({
                            "delta": req.delta,
                            "reason": req.reason.to_string(),
                        })),
                    )
                    .await?;

                    Ok(product)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.emit(Event::StockAdjusted {
            product_id,
            delta: request.delta,
            stock_after: updated.stock,
            reason: request.reason.to_string(),
        })
        .await;
        if updated.stock <= updated.min_stock {
            self.emit(Event::LowStock {
                product_id,
                stock: updated.stock,
                min_stock: updated.min_stock,
            })
            .await;
        }

        Ok(updated)
    }

    /// Compares a product's materialized stock against the sum of its
    /// ledger deltas. With `repair`, the stock is rewritten from the
    /// ledger (the ledger is the source of truth).
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn reconcile_stock(
        &self,
        product_id: Uuid,
        repair: bool,
    ) -> Result<StockReconciliation, ServiceError> {
        let db = &*self.db_pool;
        let product = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let deltas: Vec<i32> = stock_history::Entity::find()
            .filter(stock_history::Column::ProductId.eq(product_id))
            .select_only()
            .column(stock_history::Column::Delta)
            .into_tuple()
            .all(db)
            .await?;
        let ledger_sum: i64 = deltas.iter().map(|d| *d as i64).sum();
        let drift = product.stock as i64 - ledger_sum;

        let mut repaired = false;
        if repair && drift != 0 {
            let mut active: product::ActiveModel = product.clone().into();
            active.stock = Set(ledger_sum as i32);
            active.updated_at = Set(Some(Utc::now()));
            active.update(db).await?;
            repaired = true;
            warn!(product_id = %product_id, drift, "stock drift repaired from ledger");
        }

        Ok(StockReconciliation {
            product_id,
            stock: product.stock,
            ledger_sum,
            drift,
            repaired,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn create_category(
        &self,
        user_id: Uuid,
        request: CreateCategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let taken = category::Entity::find()
            .filter(category::Column::Name.eq(request.name.clone()))
            .count(db)
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category {} already exists",
                request.name
            )));
        }

        let saved = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            description: Set(request.description),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        audit::log_activity(db, user_id, "category.create", "category", saved.id, None).await?;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(db)
            .await?)
    }
}
