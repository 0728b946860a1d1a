use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Action, AuthUser};
use crate::entities::{customer, loyalty_history};
use crate::errors::ServiceError;
use crate::services::customers::{
    CreateCustomerRequest, LoyaltyBalance, UpdateCustomerRequest,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct CustomerListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Matches against name or email
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoyaltyResponse {
    pub balance: LoyaltyBalance,
    pub ledger: PaginatedResponse<loyalty_history::Model>,
}

pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CustomerListQuery>,
) -> ApiResult<PaginatedResponse<customer::Model>> {
    user.require(Action::CustomerRead)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (customers, total) = state
        .services
        .customers
        .list_customers(page, limit, query.search)
        .await?;

    let total_pages = total.div_ceil(limit);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: customers,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<customer::Model> {
    user.require(Action::CustomerRead)?;

    match state.services.customers.get_customer(id).await? {
        Some(customer) => Ok(Json(ApiResponse::success(customer))),
        None => Err(ServiceError::NotFound(format!("Customer {id} not found"))),
    }
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<customer::Model>>), ServiceError> {
    user.require(Action::CustomerCreate)?;

    let created = state
        .services
        .customers
        .create_customer(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> ApiResult<customer::Model> {
    user.require(Action::CustomerWrite)?;

    let updated = state
        .services
        .customers
        .update_customer(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Action::CustomerWrite)?;

    state
        .services
        .customers
        .delete_customer(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(())))
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct LedgerQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Balance plus a page of the loyalty ledger.
pub async fn loyalty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<LoyaltyResponse> {
    user.require(Action::CustomerRead)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let balance = state.services.customers.loyalty_balance(id).await?;
    let (entries, total) = state
        .services
        .customers
        .loyalty_ledger(id, page, limit)
        .await?;

    let total_pages = total.div_ceil(limit);
    Ok(Json(ApiResponse::success(LoyaltyResponse {
        balance,
        ledger: PaginatedResponse {
            items: entries,
            total,
            page,
            limit,
            total_pages,
        },
    })))
}

/// Rebuilds the materialized balance from the ledger.
pub async fn reconcile_loyalty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<LoyaltyBalance> {
    user.require(Action::CustomerWrite)?;

    let balance = state.services.customers.reconcile_loyalty(id).await?;
    Ok(Json(ApiResponse::success(balance)))
}
