use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Action, AuthUser};
use crate::entities::return_order;
use crate::errors::ServiceError;
use crate::services::returns::{CreateReturnRequest, ReturnResponse};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReturnListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
}

pub async fn list_returns(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<PaginatedResponse<return_order::Model>> {
    user.require(Action::ReturnRead)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (returns, total) = state.services.returns.list_returns(page, limit).await?;

    let total_pages = total.div_ceil(limit);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: returns,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnResponse> {
    user.require(Action::ReturnRead)?;

    match state.services.returns.get_return(id).await? {
        Some(ret) => Ok(Json(ApiResponse::success(ret))),
        None => Err(ServiceError::NotFound(format!("Return {id} not found"))),
    }
}

pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnResponse>>), ServiceError> {
    user.require(Action::ReturnCreate)?;

    let created = state
        .services
        .returns
        .create_return(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}
