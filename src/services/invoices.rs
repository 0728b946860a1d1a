use crate::{
    db::DbPool,
    entities::{invoice, invoice_item, loyalty_history, product, return_order, stock_history},
    entities::customer,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{InvoiceStatus, LoyaltyReason, StockReason},
    services::audit,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref INVOICE_CREATIONS: IntCounter = IntCounter::new(
        "invoice_creations_total",
        "Total number of invoices created"
    )
    .expect("metric can be created");
    static ref INVOICE_CREATION_FAILURES: IntCounter = IntCounter::new(
        "invoice_creation_failures_total",
        "Total number of failed invoice creations"
    )
    .expect("metric can be created");
    static ref INVOICE_VOIDS: IntCounter =
        IntCounter::new("invoice_voids_total", "Total number of invoices voided")
            .expect("metric can be created");
}

/// Currency units per loyalty point: 1 point per 10 spent, floor-rounded.
const LOYALTY_UNIT: Decimal = Decimal::TEN;

const INVOICE_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Defaults to the product's current price when omitted
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub items: Vec<CreateInvoiceLine>,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl From<invoice_item::Model> for InvoiceItemResponse {
    fn from(model: invoice_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            unit_price: model.unit_price,
            tax_rate: model.tax_rate,
            tax_amount: model.tax_amount,
            discount: model.discount,
            total: model.total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub user_id: Uuid,
    pub status: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<InvoiceItemResponse>,
}

impl InvoiceResponse {
    fn from_parts(invoice: invoice::Model, items: Vec<invoice_item::Model>) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            customer_id: invoice.customer_id,
            user_id: invoice.user_id,
            status: invoice.status,
            payment_method: invoice.payment_method,
            subtotal: invoice.subtotal,
            tax_amount: invoice.tax_amount,
            discount_amount: invoice.discount_amount,
            total_amount: invoice.total_amount,
            notes: invoice.notes,
            created_at: invoice.created_at,
            items: items.into_iter().map(InvoiceItemResponse::from).collect(),
        }
    }
}

/// One fully priced line, ready to persist.
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    discount: Decimal,
    total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InvoiceTotals {
    subtotal: Decimal,
    tax_amount: Decimal,
    discount_amount: Decimal,
    total_amount: Decimal,
}

/// Prices a line from quantity, unit price, per-line discount and the
/// product's tax rate (a percentage). Tax applies to the discounted amount.
fn price_line(
    product_id: Uuid,
    product_name: &str,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
) -> Result<PricedLine, ServiceError> {
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Unit price for {product_name} must not be negative"
        )));
    }
    let gross = unit_price * Decimal::from(quantity);
    if discount < Decimal::ZERO || discount > gross {
        return Err(ServiceError::ValidationError(format!(
            "Discount for {product_name} must be between 0 and the line amount"
        )));
    }
    let net = gross - discount;
    let tax_amount = (net * tax_rate / Decimal::ONE_HUNDRED).round_dp(2);

    Ok(PricedLine {
        product_id,
        product_name: product_name.to_string(),
        quantity,
        unit_price,
        tax_rate,
        tax_amount,
        discount,
        total: net + tax_amount,
    })
}

/// Sums priced lines into invoice totals. Server-side only; client-submitted
/// totals are never trusted.
fn compute_totals(lines: &[PricedLine]) -> InvoiceTotals {
    let subtotal: Decimal = lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum();
    let discount_amount: Decimal = lines.iter().map(|l| l.discount).sum();
    let tax_amount: Decimal = lines.iter().map(|l| l.tax_amount).sum();

    InvoiceTotals {
        subtotal,
        tax_amount,
        discount_amount,
        total_amount: subtotal - discount_amount + tax_amount,
    }
}

/// Points accrued for a given invoice total: floor(total / 10), never
/// negative. Void reversal recomputes this same formula.
pub fn loyalty_points_for(total: Decimal) -> i32 {
    (total / LOYALTY_UNIT)
        .floor()
        .to_i32()
        .unwrap_or(0)
        .max(0)
}

/// Generates an invoice number of the form `INV-YYYYMMDD-XXXX`.
fn generate_invoice_number(date: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("INV-{}-{:04}", date.format("%Y%m%d"), suffix)
}

/// Decrements product stock iff enough is available, in a single guarded
/// UPDATE. Returns the product as it stands after the write. Because check
/// and decrement are one statement, two concurrent sales cannot both pass
/// the availability check: this needs only statement atomicity from the
/// store, not serializable isolation.
async fn decrement_stock(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<product::Model, ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(
            product::Column::UpdatedAt,
            Expr::value(Some(Utc::now())),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Not enough stock for product {product_id}"
        )));
    }

    product::Entity::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
}

/// Restores stock for a line (void or completed return) and returns the
/// product after the write.
pub(crate) async fn restore_stock(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<product::Model, ServiceError> {
    product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .col_expr(
            product::Column::UpdatedAt,
            Expr::value(Some(Utc::now())),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(txn)
        .await?;

    product::Entity::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
}

/// Appends a stock_history row.
pub(crate) async fn record_stock_delta(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    delta: i32,
    reason: StockReason,
    stock_after: i32,
    invoice_id: Option<Uuid>,
    return_order_id: Option<Uuid>,
    user_id: Option<Uuid>,
    note: Option<String>,
) -> Result<(), ServiceError> {
    stock_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        delta: Set(delta),
        reason: Set(reason.to_string()),
        stock_after: Set(stock_after),
        invoice_id: Set(invoice_id),
        return_order_id: Set(return_order_id),
        user_id: Set(user_id),
        note: Set(note),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

/// Applies a loyalty delta to the customer row and appends the matching
/// ledger entry in the same transaction.
pub(crate) async fn apply_loyalty_delta(
    txn: &DatabaseTransaction,
    customer_id: Uuid,
    delta_points: i32,
    delta_purchases: Decimal,
    reason: LoyaltyReason,
    invoice_id: Option<Uuid>,
    return_order_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    let result = customer::Entity::update_many()
        .col_expr(
            customer::Column::LoyaltyPoints,
            Expr::col(customer::Column::LoyaltyPoints).add(delta_points),
        )
        .col_expr(
            customer::Column::TotalPurchases,
            Expr::col(customer::Column::TotalPurchases).add(delta_purchases),
        )
        .col_expr(
            customer::Column::UpdatedAt,
            Expr::value(Some(Utc::now())),
        )
        .filter(customer::Column::Id.eq(customer_id))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "Customer {customer_id} not found"
        )));
    }

    loyalty_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        delta_points: Set(delta_points),
        delta_purchases: Set(delta_purchases),
        reason: Set(reason.to_string()),
        invoice_id: Set(invoice_id),
        return_order_id: Set(return_order_id),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

/// Service for the invoice creation and void workflows.
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoiceService {
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

    /// Creates an invoice atomically: price lines server-side, generate a
    /// unique invoice number, persist invoice + items, decrement stock with
    /// a ledger entry per line, accrue loyalty for an attached customer,
    /// and append the audit entry. Nothing is visible until commit.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_invoice(
        &self,
        user_id: Uuid,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate().map_err(|e| {
            INVOICE_CREATION_FAILURES.inc();
            ServiceError::ValidationError(e.to_string())
        })?;
        for line in &request.items {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let db = self.db_pool.clone();
        let req = request.clone();

        let outcome = db
            .transaction::<_, (invoice::Model, Vec<invoice_item::Model>, Vec<product::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let now = Utc::now();
                        let invoice_id = Uuid::new_v4();

                        // Price every line from the product row; unknown or
                        // inactive products fail the whole request.
                        let mut priced = Vec::with_capacity(req.items.len());
                        for line in &req.items {
                            let product = product::Entity::find_by_id(line.product_id)
                                .one(txn)
                                .await?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "Product {} not found",
                                        line.product_id
                                    ))
                                })?;
                            if !product.active {
                                return Err(ServiceError::ValidationError(format!(
                                    "Product {} is inactive",
                                    product.sku
                                )));
                            }
                            let unit_price = line.unit_price.unwrap_or(product.price);
                            priced.push(price_line(
                                product.id,
                                &product.name,
                                line.quantity,
                                unit_price,
                                line.discount,
                                product.tax_rate,
                            )?);
                        }
                        let totals = compute_totals(&priced);

                        // Retry the random suffix on collision; the unique
                        // index on invoice_number is the backstop.
                        let mut invoice_number = None;
                        for _ in 0..INVOICE_NUMBER_ATTEMPTS {
                            let candidate = generate_invoice_number(now);
                            let taken = invoice::Entity::find()
                                .filter(invoice::Column::InvoiceNumber.eq(candidate.clone()))
                                .count(txn)
                                .await?;
                            if taken == 0 {
                                invoice_number = Some(candidate);
                                break;
                            }
                        }
                        let invoice_number = invoice_number.ok_or_else(|| {
                            ServiceError::Conflict(
                                "Could not allocate a unique invoice number".to_string(),
                            )
                        })?;

                        let saved_invoice = invoice::ActiveModel {
                            id: Set(invoice_id),
                            invoice_number: Set(invoice_number),
                            customer_id: Set(req.customer_id),
                            user_id: Set(user_id),
                            status: Set(InvoiceStatus::Paid.to_string()),
                            payment_method: Set(req.payment_method.clone()),
                            subtotal: Set(totals.subtotal),
                            tax_amount: Set(totals.tax_amount),
                            discount_amount: Set(totals.discount_amount),
                            total_amount: Set(totals.total_amount),
                            notes: Set(req.notes.clone()),
                            created_at: Set(now),
                            updated_at: Set(Some(now)),
                        }
                        .insert(txn)
                        .await?;

                        let mut saved_items = Vec::with_capacity(priced.len());
                        let mut touched_products = Vec::with_capacity(priced.len());
                        for line in &priced {
                            let item = invoice_item::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                invoice_id: Set(invoice_id),
                                product_id: Set(line.product_id),
                                product_name: Set(line.product_name.clone()),
                                quantity: Set(line.quantity),
                                unit_price: Set(line.unit_price),
                                tax_rate: Set(line.tax_rate),
                                tax_amount: Set(line.tax_amount),
                                discount: Set(line.discount),
                                total: Set(line.total),
                                created_at: Set(now),
                            }
                            .insert(txn)
                            .await?;
                            saved_items.push(item);

                            let product =
                                decrement_stock(txn, line.product_id, line.quantity).await?;
                            record_stock_delta(
                                txn,
                                line.product_id,
                                -line.quantity,
                                StockReason::Sale,
                                product.stock,
                                Some(invoice_id),
                                None,
                                Some(user_id),
                                None,
                            )
                            .await?;
                            touched_products.push(product);
                        }

                        if let Some(customer_id) = req.customer_id {
                            let points = loyalty_points_for(totals.total_amount);
                            apply_loyalty_delta(
                                txn,
                                customer_id,
                                points,
                                totals.total_amount,
                                LoyaltyReason::Accrual,
                                Some(invoice_id),
                                None,
                            )
                            .await?;
                        }

                        audit::log_activity(
                            txn,
                            user_id,
                            "invoice.create",
                            "invoice",
                            invoice_id,
                            Some(serde_json::json!({
                                "invoice_number": saved_invoice.invoice_number.clone(),
                                "total_amount": totals.total_amount,
                                "lines": saved_items.len(),
                            })),
                        )
                        .await?;

                        Ok((saved_invoice, saved_items, touched_products))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            });

        let (saved_invoice, saved_items, touched_products) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                INVOICE_CREATION_FAILURES.inc();
                error!(error = %e, "invoice creation failed");
                return Err(e);
            }
        };

        INVOICE_CREATIONS.inc();
        info!(
            invoice_id = %saved_invoice.id,
            invoice_number = %saved_invoice.invoice_number,
            total = %saved_invoice.total_amount,
            "invoice created"
        );

        self.emit(Event::InvoiceCreated(saved_invoice.id)).await;
        for product in &touched_products {
            if product.stock <= product.min_stock {
                self.emit(Event::LowStock {
                    product_id: product.id,
                    stock: product.stock,
                    min_stock: product.min_stock,
                })
                .await;
            }
        }

        Ok(InvoiceResponse::from_parts(saved_invoice, saved_items))
    }

    /// Voids an invoice: restores stock for every line, reverses loyalty
    /// with the same fixed-rate formula used at accrual, and flips the
    /// status. Rejected when already voided or when returns exist.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, user_id = %user_id))]
    pub async fn void_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = self.db_pool.clone();

        let (voided, items) = db
            .transaction::<_, (invoice::Model, Vec<invoice_item::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let invoice = invoice::Entity::find_by_id(invoice_id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Invoice {invoice_id} not found"
                                ))
                            })?;

                        let status = InvoiceStatus::parse(&invoice.status)?;
                        if status == InvoiceStatus::Voided {
                            return Err(ServiceError::Conflict(format!(
                                "Invoice {} is already voided",
                                invoice.invoice_number
                            )));
                        }

                        let returns = return_order::Entity::find()
                            .filter(return_order::Column::InvoiceId.eq(invoice_id))
                            .count(txn)
                            .await?;
                        if returns > 0 {
                            return Err(ServiceError::Conflict(format!(
                                "Invoice {} has returns and cannot be voided",
                                invoice.invoice_number
                            )));
                        }

                        let items = invoice_item::Entity::find()
                            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
                            .all(txn)
                            .await?;

                        for item in &items {
                            let product =
                                restore_stock(txn, item.product_id, item.quantity).await?;
                            record_stock_delta(
                                txn,
                                item.product_id,
                                item.quantity,
                                StockReason::Adjustment,
                                product.stock,
                                Some(invoice_id),
                                None,
                                Some(user_id),
                                Some("invoice void".to_string()),
                            )
                            .await?;
                        }

                        if let Some(customer_id) = invoice.customer_id {
                            // Recompute from the same formula used at accrual.
                            let points = loyalty_points_for(invoice.total_amount);
                            apply_loyalty_delta(
                                txn,
                                customer_id,
                                -points,
                                -invoice.total_amount,
                                LoyaltyReason::Reversal,
                                Some(invoice_id),
                                None,
                            )
                            .await?;
                        }

                        let mut active: invoice::ActiveModel = invoice.into();
                        active.status = Set(InvoiceStatus::Voided.to_string());
                        active.updated_at = Set(Some(Utc::now()));
                        let voided = active.update(txn).await?;

                        audit::log_activity(
                            txn,
                            user_id,
                            "invoice.void",
                            "invoice",
                            invoice_id,
                            Some(serde_json::json!({
                                "invoice_number": voided.invoice_number.clone(),
                            })),
                        )
                        .await?;

                        Ok((voided, items))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        INVOICE_VOIDS.inc();
        info!(invoice_id = %voided.id, "invoice voided");
        self.emit(Event::InvoiceVoided(voided.id)).await;

        Ok(InvoiceResponse::from_parts(voided, items))
    }

    /// Fetches an invoice with its items.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceResponse>, ServiceError> {
        let db = &*self.db_pool;
        let Some(invoice) = invoice::Entity::find_by_id(invoice_id).one(db).await? else {
            return Ok(None);
        };
        let items = invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .all(db)
            .await?;
        Ok(Some(InvoiceResponse::from_parts(invoice, items)))
    }

    /// Lists invoices newest-first with pagination and an optional status
    /// filter.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        page: u64,
        limit: u64,
        status: Option<InvoiceStatus>,
    ) -> Result<(Vec<invoice::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = invoice::Entity::find().order_by_desc(invoice::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(invoice::Column::Status.eq(status.to_string()));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((invoices, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(qty: i32, price: Decimal, discount: Decimal, tax_rate: Decimal) -> PricedLine {
        price_line(Uuid::new_v4(), "test", qty, price, discount, tax_rate).unwrap()
    }

    #[test]
    fn totals_match_worked_example() {
        // Two items at 100 x2 and 50 x1, 10% tax: subtotal 250, tax 25,
        // total 275.
        let lines = vec![
            line(2, dec!(100), Decimal::ZERO, dec!(10)),
            line(1, dec!(50), Decimal::ZERO, dec!(10)),
        ];
        let totals = compute_totals(&lines);
        assert_eq!(totals.subtotal, dec!(250));
        assert_eq!(totals.tax_amount, dec!(25.00));
        assert_eq!(totals.discount_amount, Decimal::ZERO);
        assert_eq!(totals.total_amount, dec!(275.00));
    }

    #[test]
    fn item_totals_reconcile_with_invoice_total() {
        let lines = vec![
            line(3, dec!(19.99), dec!(5), dec!(8.25)),
            line(1, dec!(250), Decimal::ZERO, dec!(0)),
            line(2, dec!(7.40), dec!(1.20), dec!(21)),
        ];
        let totals = compute_totals(&lines);
        let item_sum: Decimal = lines.iter().map(|l| l.total).sum();
        assert_eq!(item_sum, totals.total_amount);
        assert_eq!(
            totals.total_amount,
            totals.subtotal - totals.discount_amount + totals.tax_amount
        );
    }

    #[test]
    fn discount_reduces_taxable_amount() {
        let l = line(1, dec!(100), dec!(20), dec!(10));
        assert_eq!(l.tax_amount, dec!(8.00));
        assert_eq!(l.total, dec!(88.00));
    }

    #[test]
    fn discount_beyond_line_amount_is_rejected() {
        let err = price_line(Uuid::new_v4(), "test", 1, dec!(10), dec!(11), dec!(0));
        assert!(matches!(err, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn loyalty_points_floor_at_ten_units_per_point() {
        assert_eq!(loyalty_points_for(dec!(275)), 27);
        assert_eq!(loyalty_points_for(dec!(9.99)), 0);
        assert_eq!(loyalty_points_for(dec!(10)), 1);
        assert_eq!(loyalty_points_for(dec!(0)), 0);
        assert_eq!(loyalty_points_for(dec!(-50)), 0);
    }

    #[test]
    fn invoice_numbers_follow_the_scheme() {
        let now = Utc::now();
        let number = generate_invoice_number(now);
        let expected_prefix = format!("INV-{}-", now.format("%Y%m%d"));
        assert!(number.starts_with(&expected_prefix));
        let suffix = &number[expected_prefix.len()..];
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }
}
