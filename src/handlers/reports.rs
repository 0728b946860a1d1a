use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::services::reports::{
    CategoryBreakdownReport, CustomerReport, InventoryValuationReport, PaymentMethodReport,
    ProductPerformanceReport, ReportWindow, SalesSummaryReport, TimeBucket,
};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportQuery {
    /// Window start (inclusive), RFC 3339
    pub from: DateTime<Utc>,
    /// Window end (exclusive), RFC 3339
    pub to: DateTime<Utc>,
    /// Include voided invoices in the aggregation
    #[serde(default)]
    pub include_voided: bool,
    /// Time bucket for trend reports: day, week or month
    pub bucket: Option<String>,
}

impl ReportQuery {
    fn window(&self) -> Result<ReportWindow, ServiceError> {
        if self.from >= self.to {
            return Err(ServiceError::ValidationError(
                "Report window start must precede its end".to_string(),
            ));
        }
        Ok(ReportWindow {
            from: self.from,
            to: self.to,
            include_voided: self.include_voided,
        })
    }

    fn bucket(&self) -> Result<TimeBucket, ServiceError> {
        match self.bucket.as_deref() {
            None => Ok(TimeBucket::Day),
            Some(raw) => raw.parse().map_err(|_| {
                ServiceError::ValidationError(format!("Unknown time bucket: {raw}"))
            }),
        }
    }
}

pub async fn sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<SalesSummaryReport> {
    user.require(Action::ReportRead)?;

    let report = state
        .services
        .reports
        .sales_summary(query.window()?, query.bucket()?)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn payment_methods(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<PaymentMethodReport> {
    user.require(Action::ReportRead)?;

    let report = state
        .services
        .reports
        .payment_method_breakdown(query.window()?)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ProductPerformanceReport> {
    user.require(Action::ReportRead)?;

    let report = state
        .services
        .reports
        .product_performance(query.window()?)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn categories(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<CategoryBreakdownReport> {
    user.require(Action::ReportRead)?;

    let report = state
        .services
        .reports
        .category_breakdown(query.window()?)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Snapshot valuation; takes no window.
pub async fn inventory(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<InventoryValuationReport> {
    user.require(Action::ReportRead)?;

    let report = state.services.reports.inventory_valuation().await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn customers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<CustomerReport> {
    user.require(Action::ReportRead)?;

    let report = state
        .services
        .reports
        .customer_report(query.window()?)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
