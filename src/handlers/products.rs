use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Action, AuthUser};
use crate::entities::{category, product};
use crate::errors::ServiceError;
use crate::services::products::{
    AdjustStockRequest, CreateCategoryRequest, CreateProductRequest, StockReconciliation,
    UpdateProductRequest,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ProductListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Matches against product name or SKU
    pub search: Option<String>,
    /// Include deactivated products
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReconcileQuery {
    /// Rewrite stock from the ledger when drift is found
    #[serde(default)]
    pub repair: bool,
}

pub async fn list_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    user.require(Action::ProductRead)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (products, total) = state
        .services
        .products
        .list_products(page, limit, query.search, query.include_inactive)
        .await?;

    let total_pages = total.div_ceil(limit);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: products,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    user.require(Action::ProductRead)?;

    match state.services.products.get_product(id).await? {
        Some(product) => Ok(Json(ApiResponse::success(product))),
        None => Err(ServiceError::NotFound(format!("Product {id} not found"))),
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    user.require(Action::ProductWrite)?;

    let created = state
        .services
        .products
        .create_product(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<product::Model> {
    user.require(Action::ProductWrite)?;

    let updated = state
        .services
        .products
        .update_product(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Action::ProductWrite)?;

    state
        .services
        .products
        .delete_product(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<product::Model> {
    user.require(Action::StockAdjust)?;

    let updated = state
        .services
        .products
        .adjust_stock(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn low_stock(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<product::Model>> {
    user.require(Action::ProductRead)?;

    let products = state.services.products.low_stock().await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn reconcile_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ReconcileQuery>,
) -> ApiResult<StockReconciliation> {
    user.require(Action::StockAdjust)?;

    let report = state
        .services
        .products
        .reconcile_stock(id, query.repair)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<category::Model>> {
    user.require(Action::ProductRead)?;

    let categories = state.services.products.list_categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<category::Model>>), ServiceError> {
    user.require(Action::ProductWrite)?;

    let created = state
        .services
        .products
        .create_category(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}
