use crate::{
    db::DbPool,
    entities::{customer, invoice, invoice_item, return_item, return_order},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{InvoiceStatus, LoyaltyReason, ReturnStatus, StockReason},
    services::audit,
    services::invoices::{apply_loyalty_delta, loyalty_points_for, record_stock_delta, restore_stock},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateReturnLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Defaults to the unit price on the invoice line
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateReturnRequest {
    pub invoice_id: Uuid,
    #[validate(length(min = 1, message = "At least one return line is required"))]
    pub items: Vec<CreateReturnLine>,
    #[validate(length(min = 1, message = "Reason cannot be empty"))]
    pub reason: String,
    /// When false the return is recorded as PENDING: no stock or loyalty
    /// side effects until it completes.
    #[serde(default = "default_complete")]
    pub complete: bool,
}

fn default_complete() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<return_item::Model> for ReturnItemResponse {
    fn from(model: return_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            line_total: model.line_total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub reason: String,
    pub refund_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<ReturnItemResponse>,
}

impl ReturnResponse {
    fn from_parts(order: return_order::Model, items: Vec<return_item::Model>) -> Self {
        Self {
            id: order.id,
            invoice_id: order.invoice_id,
            user_id: order.user_id,
            status: order.status,
            reason: order.reason,
            refund_amount: order.refund_amount,
            created_at: order.created_at,
            items: items.into_iter().map(ReturnItemResponse::from).collect(),
        }
    }
}

/// Invoiced quantity and unit price per product on the invoice.
type InvoicedLines = HashMap<Uuid, (i32, Decimal)>;

/// Checks every requested line against the invoice and the cumulative
/// quantities already returned. Enforces
/// `requested + previously_returned <= invoiced` per product.
fn validate_return_lines(
    invoiced: &InvoicedLines,
    already_returned: &HashMap<Uuid, i32>,
    lines: &[CreateReturnLine],
) -> Result<(), ServiceError> {
    let mut requested: HashMap<Uuid, i32> = HashMap::new();
    for line in lines {
        *requested.entry(line.product_id).or_insert(0) += line.quantity;
    }

    for (product_id, quantity) in &requested {
        let (invoiced_qty, _) = invoiced.get(product_id).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Product {product_id} is not on the invoice"
            ))
        })?;
        let prior = already_returned.get(product_id).copied().unwrap_or(0);
        if prior + quantity > *invoiced_qty {
            return Err(ServiceError::ValidationError(format!(
                "Return quantity for product {product_id} exceeds the invoiced quantity \
                 ({} requested, {} already returned, {} invoiced)",
                quantity, prior, invoiced_qty
            )));
        }
    }
    Ok(())
}

/// True when every invoiced line has been returned in full, counting all
/// completed returns.
fn is_fully_returned(invoiced: &InvoicedLines, cumulative: &HashMap<Uuid, i32>) -> bool {
    invoiced
        .iter()
        .all(|(product_id, (qty, _))| cumulative.get(product_id).copied().unwrap_or(0) >= *qty)
}

/// Service for the return/refund workflow.
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReturnService {
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

    /// Creates a return against an invoice atomically. A completed return
    /// restores stock with a ledger entry per line, deducts loyalty
    /// proportionally to the refund, and marks the invoice REFUNDED once
    /// every line has been returned in full across all returns.
    #[instrument(skip(self, request), fields(invoice_id = %request.invoice_id, user_id = %user_id))]
    pub async fn create_return(
        &self,
        user_id: Uuid,
        request: CreateReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for line in &request.items {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let db = self.db_pool.clone();
        let req = request.clone();

        let (order, items, fully_returned) = db
            .transaction::<_, (return_order::Model, Vec<return_item::Model>, bool), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let invoice = invoice::Entity::find_by_id(req.invoice_id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Invoice {} not found",
                                    req.invoice_id
                                ))
                            })?;

                        match InvoiceStatus::parse(&invoice.status)? {
                            InvoiceStatus::Voided => {
                                return Err(ServiceError::InvalidOperation(
                                    "Cannot return items from a voided invoice".to_string(),
                                ))
                            }
                            InvoiceStatus::Refunded => {
                                return Err(ServiceError::Conflict(format!(
                                    "Invoice {} is already fully refunded",
                                    invoice.invoice_number
                                )))
                            }
                            _ => {}
                        }

                        let invoice_items = invoice_item::Entity::find()
                            .filter(invoice_item::Column::InvoiceId.eq(invoice.id))
                            .all(txn)
                            .await?;
                        let mut invoiced: InvoicedLines = HashMap::new();
                        for item in &invoice_items {
                            let entry = invoiced
                                .entry(item.product_id)
                                .or_insert((0, item.unit_price));
                            entry.0 += item.quantity;
                        }

                        // Quantities already returned by completed returns.
                        let prior_orders = return_order::Entity::find()
                            .filter(return_order::Column::InvoiceId.eq(invoice.id))
                            .filter(
                                return_order::Column::Status
                                    .eq(ReturnStatus::Completed.to_string()),
                            )
                            .all(txn)
                            .await?;
                        let mut already_returned: HashMap<Uuid, i32> = HashMap::new();
                        if !prior_orders.is_empty() {
                            let prior_ids: Vec<Uuid> =
                                prior_orders.iter().map(|o| o.id).collect();
                            let prior_items = return_item::Entity::find()
                                .filter(return_item::Column::ReturnOrderId.is_in(prior_ids))
                                .all(txn)
                                .await?;
                            for item in prior_items {
                                *already_returned.entry(item.product_id).or_insert(0) +=
                                    item.quantity;
                            }
                        }

                        validate_return_lines(&invoiced, &already_returned, &req.items)?;

                        let now = Utc::now();
                        let return_id = Uuid::new_v4();
                        let status = if req.complete {
                            ReturnStatus::Completed
                        } else {
                            ReturnStatus::Pending
                        };

                        let mut refund_amount = Decimal::ZERO;
                        let mut priced_lines = Vec::with_capacity(req.items.len());
                        for line in &req.items {
                            let (_, invoiced_price) = invoiced[&line.product_id];
                            let unit_price = line.unit_price.unwrap_or(invoiced_price);
                            let line_total = unit_price * Decimal::from(line.quantity);
                            refund_amount += line_total;
                            priced_lines.push((line.product_id, line.quantity, unit_price, line_total));
                        }

                        let order = return_order::ActiveModel {
                            id: Set(return_id),
                            invoice_id: Set(invoice.id),
                            user_id: Set(user_id),
                            status: Set(status.to_string()),
                            reason: Set(req.reason.clone()),
                            refund_amount: Set(refund_amount),
                            created_at: Set(now),
                        }
                        .insert(txn)
                        .await?;

                        let mut saved_items = Vec::with_capacity(priced_lines.len());
                        for (product_id, quantity, unit_price, line_total) in &priced_lines {
                            let item = return_item::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                return_order_id: Set(return_id),
                                product_id: Set(*product_id),
                                quantity: Set(*quantity),
                                unit_price: Set(*unit_price),
                                line_total: Set(*line_total),
                            }
                            .insert(txn)
                            .await?;
                            saved_items.push(item);
                        }

                        let mut fully_returned = false;
                        if status == ReturnStatus::Completed {
                            for (product_id, quantity, _, _) in &priced_lines {
                                let product = restore_stock(txn, *product_id, *quantity).await?;
                                record_stock_delta(
                                    txn,
                                    *product_id,
                                    *quantity,
                                    StockReason::Return,
                                    product.stock,
                                    Some(invoice.id),
                                    Some(return_id),
                                    Some(user_id),
                                    None,
                                )
                                .await?;
                            }

                            let mut cumulative = already_returned.clone();
                            for (product_id, quantity, _, _) in &priced_lines {
                                *cumulative.entry(*product_id).or_insert(0) += quantity;
                            }
                            fully_returned = is_fully_returned(&invoiced, &cumulative);

                            if fully_returned {
                                let mut active: invoice::ActiveModel = invoice.clone().into();
                                active.status = Set(InvoiceStatus::Refunded.to_string());
                                active.updated_at = Set(Some(now));
                                active.update(txn).await?;
                            }

                            if let Some(customer_id) = invoice.customer_id {
                                // Deduction is proportional to the refund and
                                // never drives the balance negative.
                                let balance = customer::Entity::find_by_id(customer_id)
                                    .one(txn)
                                    .await?
                                    .map(|c| c.loyalty_points)
                                    .unwrap_or(0);
                                let points =
                                    loyalty_points_for(refund_amount).min(balance.max(0));
                                apply_loyalty_delta(
                                    txn,
                                    customer_id,
                                    -points,
                                    -refund_amount,
                                    LoyaltyReason::Refund,
                                    Some(invoice.id),
                                    Some(return_id),
                                )
                                .await?;
                            }
                        }

                        audit::log_activity(
                            txn,
                            user_id,
                            "return.create",
                            "return_order",
                            return_id,
                            Some(serde_json::json!({
                                "invoice_id": invoice.id,
                                "refund_amount": refund_amount,
                                "status": status.to_string(),
                            })),
                        )
                        .await?;

                        Ok((order, saved_items, fully_returned))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            return_id = %order.id,
            invoice_id = %order.invoice_id,
            refund = %order.refund_amount,
            "return created"
        );

        self.emit(Event::ReturnCreated(order.id)).await;
        if ReturnStatus::parse(&order.status)? == ReturnStatus::Completed {
            self.emit(Event::ReturnCompleted {
                return_id: order.id,
                invoice_id: order.invoice_id,
                fully_returned,
            })
            .await;
        }

        Ok(ReturnResponse::from_parts(order, items))
    }

    /// Fetches a return with its items.
    #[instrument(skip(self))]
    pub async fn get_return(
        &self,
        return_id: Uuid,
    ) -> Result<Option<ReturnResponse>, ServiceError> {
        let db = &*self.db_pool;
        let Some(order) = return_order::Entity::find_by_id(return_id).one(db).await? else {
            return Ok(None);
        };
        let items = return_item::Entity::find()
            .filter(return_item::Column::ReturnOrderId.eq(return_id))
            .all(db)
            .await?;
        Ok(Some(ReturnResponse::from_parts(order, items)))
    }

    /// Lists returns newest-first with pagination.
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<return_order::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = return_order::Entity::find()
            .order_by_desc(return_order::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let returns = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((returns, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoiced(entries: &[(Uuid, i32)]) -> InvoicedLines {
        entries
            .iter()
            .map(|(id, qty)| (*id, (*qty, dec!(10))))
            .collect()
    }

    #[test]
    fn return_of_unknown_product_is_rejected() {
        let on_invoice = Uuid::new_v4();
        let lines = vec![CreateReturnLine {
            product_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: None,
        }];
        let err = validate_return_lines(&invoiced(&[(on_invoice, 2)]), &HashMap::new(), &lines);
        assert!(matches!(err, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn cumulative_over_return_is_rejected() {
        let product = Uuid::new_v4();
        let mut prior = HashMap::new();
        prior.insert(product, 2);

        // 2 of 3 already returned; asking for 2 more exceeds the invoice.
        let lines = vec![CreateReturnLine {
            product_id: product,
            quantity: 2,
            unit_price: None,
        }];
        let err = validate_return_lines(&invoiced(&[(product, 3)]), &prior, &lines);
        assert!(matches!(err, Err(ServiceError::ValidationError(_))));

        // One more is still fine.
        let lines = vec![CreateReturnLine {
            product_id: product,
            quantity: 1,
            unit_price: None,
        }];
        assert!(validate_return_lines(&invoiced(&[(product, 3)]), &prior, &lines).is_ok());
    }

    #[test]
    fn duplicate_lines_count_toward_the_same_cap() {
        let product = Uuid::new_v4();
        let lines = vec![
            CreateReturnLine {
                product_id: product,
                quantity: 2,
                unit_price: None,
            },
            CreateReturnLine {
                product_id: product,
                quantity: 2,
                unit_price: None,
            },
        ];
        let err = validate_return_lines(&invoiced(&[(product, 3)]), &HashMap::new(), &lines);
        assert!(matches!(err, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn full_return_detection_counts_all_lines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let inv = invoiced(&[(a, 2), (b, 1)]);

        let mut partial = HashMap::new();
        partial.insert(a, 2);
        assert!(!is_fully_returned(&inv, &partial));

        partial.insert(b, 1);
        assert!(is_fully_returned(&inv, &partial));
    }
}
