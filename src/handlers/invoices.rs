use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Action, AuthUser};
use crate::models::InvoiceStatus;
use crate::services::invoices::{CreateInvoiceRequest, InvoiceResponse};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};
use crate::errors::ServiceError;
use crate::entities::invoice;

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct InvoiceListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    /// Optional status filter, e.g. PAID or VOIDED
    pub status: Option<String>,
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<InvoiceListQuery>,
) -> ApiResult<PaginatedResponse<invoice::Model>> {
    user.require(Action::InvoiceRead)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(InvoiceStatus::parse)
        .transpose()?;

    let (invoices, total) = state
        .services
        .invoices
        .list_invoices(page, limit, status)
        .await?;

    let total_pages = total.div_ceil(limit);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: invoices,
        total,
        page,
        limit,
        total_pages,
    })))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceResponse> {
    user.require(Action::InvoiceRead)?;

    match state.services.invoices.get_invoice(id).await? {
        Some(invoice) => Ok(Json(ApiResponse::success(invoice))),
        None => Err(ServiceError::NotFound(format!("Invoice {id} not found"))),
    }
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceResponse>>), ServiceError> {
    user.require(Action::InvoiceCreate)?;

    let created = state
        .services
        .invoices
        .create_invoice(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// DELETE voids the invoice rather than erasing it; sales history is
/// retained for reporting and the stock ledger.
pub async fn void_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceResponse> {
    user.require(Action::InvoiceVoid)?;

    let voided = state
        .services
        .invoices
        .void_invoice(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(voided)))
}
