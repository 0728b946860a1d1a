use crate::{
    db::DbPool,
    entities::{category, customer, invoice, invoice_item, product},
    errors::ServiceError,
    models::InvoiceStatus,
};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Time bucket for sales trend reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Day,
    Week,
    Month,
}

/// Formats the bucket key an invoice timestamp falls into. Weeks are ISO
/// weeks, so a January invoice can land in the previous ISO year.
pub fn bucket_key(at: DateTime<Utc>, bucket: TimeBucket) -> String {
    match bucket {
        TimeBucket::Day => at.format("%Y-%m-%d").to_string(),
        TimeBucket::Week => {
            let iso = at.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        TimeBucket::Month => at.format("%Y-%m").to_string(),
    }
}

/// Share of `part` in `whole` as a percentage rounded to 2 decimals;
/// 0 when the denominator is 0.
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub include_voided: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct SalesTotals {
    pub invoice_count: i64,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub average_invoice: Decimal,
}

impl SalesTotals {
    fn absorb(&mut self, inv: &invoice::Model) {
        self.invoice_count += 1;
        self.subtotal += inv.subtotal;
        self.tax_amount += inv.tax_amount;
        self.discount_amount += inv.discount_amount;
        self.total_amount += inv.total_amount;
    }

    fn finish(&mut self) {
        self.average_invoice = if self.invoice_count == 0 {
            Decimal::ZERO
        } else {
            (self.total_amount / Decimal::from(self.invoice_count)).round_dp(2)
        };
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SalesPeriod {
    pub period: String,
    #[serde(flatten)]
    pub totals: SalesTotals,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SalesSummaryReport {
    pub bucket: TimeBucket,
    pub periods: Vec<SalesPeriod>,
    pub overall: SalesTotals,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodRow {
    pub method: String,
    pub invoice_count: i64,
    pub amount: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodReport {
    pub total_amount: Decimal,
    pub methods: Vec<PaymentMethodRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductPerformanceRow {
    pub product_id: Uuid,
    pub product_name: String,
    pub units_sold: i64,
    pub revenue: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductPerformanceReport {
    pub total_revenue: Decimal,
    pub products: Vec<ProductPerformanceRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CategoryRow {
    pub category_id: Option<Uuid>,
    pub category_name: String,
    pub revenue: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CategoryBreakdownReport {
    pub total_revenue: Decimal,
    pub categories: Vec<CategoryRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryValuationRow {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock: i32,
    pub cost_value: Decimal,
    pub retail_value: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryValuationReport {
    pub product_count: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub total_cost_value: Decimal,
    pub total_retail_value: Decimal,
    pub products: Vec<InventoryValuationRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerRow {
    pub customer_id: Uuid,
    pub name: String,
    pub invoice_count: i64,
    pub revenue: Decimal,
    pub loyalty_points: i32,
    pub first_purchase_in_window: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerReport {
    pub new_customers: i64,
    pub returning_customers: i64,
    pub customers: Vec<CustomerRow>,
}

/// Read-only report queries. Rows are fetched and aggregated in code;
/// approximate consistency is acceptable here, so these run outside any
/// transaction.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn invoices_in_window(
        &self,
        window: &ReportWindow,
    ) -> Result<Vec<invoice::Model>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = invoice::Entity::find()
            .filter(invoice::Column::CreatedAt.gte(window.from))
            .filter(invoice::Column::CreatedAt.lt(window.to));
        if !window.include_voided {
            query = query.filter(invoice::Column::Status.ne(InvoiceStatus::Voided.to_string()));
        }
        Ok(query.all(db).await?)
    }

    /// Sales trend over the window, grouped into time buckets. The overall
    /// row always equals the sum of the per-period rows.
    #[instrument(skip(self))]
    pub async fn sales_summary(
        &self,
        window: ReportWindow,
        bucket: TimeBucket,
    ) -> Result<SalesSummaryReport, ServiceError> {
        let invoices = self.invoices_in_window(&window).await?;

        let mut overall = SalesTotals::default();
        let mut periods: HashMap<String, SalesTotals> = HashMap::new();
        for inv in &invoices {
            overall.absorb(inv);
            periods
                .entry(bucket_key(inv.created_at, bucket))
                .or_default()
                .absorb(inv);
        }
        overall.finish();

        let mut periods: Vec<SalesPeriod> = periods
            .into_iter()
            .map(|(period, mut totals)| {
                totals.finish();
                SalesPeriod { period, totals }
            })
            .collect();
        periods.sort_by(|a, b| a.period.cmp(&b.period));

        Ok(SalesSummaryReport {
            bucket,
            periods,
            overall,
        })
    }

    /// Revenue share per payment method. Percentages sum to 100 (modulo
    /// rounding) whenever the total is non-zero.
    #[instrument(skip(self))]
    pub async fn payment_method_breakdown(
        &self,
        window: ReportWindow,
    ) -> Result<PaymentMethodReport, ServiceError> {
        let invoices = self.invoices_in_window(&window).await?;

        let mut amounts: HashMap<String, (i64, Decimal)> = HashMap::new();
        let mut total = Decimal::ZERO;
        for inv in &invoices {
            let entry = amounts
                .entry(inv.payment_method.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += inv.total_amount;
            total += inv.total_amount;
        }

        let mut methods: Vec<PaymentMethodRow> = amounts
            .into_iter()
            .map(|(method, (invoice_count, amount))| PaymentMethodRow {
                method,
                invoice_count,
                amount,
                percentage: percentage(amount, total),
            })
            .collect();
        methods.sort_by(|a, b| b.amount.cmp(&a.amount));

        Ok(PaymentMethodReport {
            total_amount: total,
            methods,
        })
    }

    async fn items_for_invoices(
        &self,
        invoices: &[invoice::Model],
    ) -> Result<Vec<invoice_item::Model>, ServiceError> {
        if invoices.is_empty() {
            return Ok(Vec::new());
        }
        let db = &*self.db_pool;
        let ids: Vec<Uuid> = invoices.iter().map(|i| i.id).collect();
        Ok(invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.is_in(ids))
            .all(db)
            .await?)
    }

    /// Units and revenue per product over the window.
    #[instrument(skip(self))]
    pub async fn product_performance(
        &self,
        window: ReportWindow,
    ) -> Result<ProductPerformanceReport, ServiceError> {
        let invoices = self.invoices_in_window(&window).await?;
        let items = self.items_for_invoices(&invoices).await?;

        let mut rows: HashMap<Uuid, (String, i64, Decimal)> = HashMap::new();
        let mut total_revenue = Decimal::ZERO;
        for item in &items {
            let entry = rows
                .entry(item.product_id)
                .or_insert_with(|| (item.product_name.clone(), 0, Decimal::ZERO));
            entry.1 += item.quantity as i64;
            entry.2 += item.total;
            total_revenue += item.total;
        }

        let mut products: Vec<ProductPerformanceRow> = rows
            .into_iter()
            .map(
                |(product_id, (product_name, units_sold, revenue))| ProductPerformanceRow {
                    product_id,
                    product_name,
                    units_sold,
                    revenue,
                    percentage: percentage(revenue, total_revenue),
                },
            )
            .collect();
        products.sort_by(|a, b| b.revenue.cmp(&a.revenue));

        Ok(ProductPerformanceReport {
            total_revenue,
            products,
        })
    }

    /// Revenue share per category; items whose product has no category land
    /// in an "Uncategorized" bucket.
    #[instrument(skip(self))]
    pub async fn category_breakdown(
        &self,
        window: ReportWindow,
    ) -> Result<CategoryBreakdownReport, ServiceError> {
        let db = &*self.db_pool;
        let invoices = self.invoices_in_window(&window).await?;
        let items = self.items_for_invoices(&invoices).await?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let product_categories: HashMap<Uuid, Option<Uuid>> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .select_only()
            .column(product::Column::Id)
            .column(product::Column::CategoryId)
            .into_tuple::<(Uuid, Option<Uuid>)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        let category_names: HashMap<Uuid, String> = category::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut revenues: HashMap<Option<Uuid>, Decimal> = HashMap::new();
        let mut total_revenue = Decimal::ZERO;
        for item in &items {
            let category_id = product_categories
                .get(&item.product_id)
                .copied()
                .flatten();
            *revenues.entry(category_id).or_insert(Decimal::ZERO) += item.total;
            total_revenue += item.total;
        }

        let mut categories: Vec<CategoryRow> = revenues
            .into_iter()
            .map(|(category_id, revenue)| CategoryRow {
                category_id,
                category_name: category_id
                    .and_then(|id| category_names.get(&id).cloned())
                    .unwrap_or_else(|| "Uncategorized".to_string()),
                revenue,
                percentage: percentage(revenue, total_revenue),
            })
            .collect();
        categories.sort_by(|a, b| b.revenue.cmp(&a.revenue));

        Ok(CategoryBreakdownReport {
            total_revenue,
            categories,
        })
    }

    /// Current stock valued at cost and at retail, with low/out-of-stock
    /// counts. No time window; valuation is a snapshot.
    #[instrument(skip(self))]
    pub async fn inventory_valuation(&self) -> Result<InventoryValuationReport, ServiceError> {
        let db = &*self.db_pool;
        let products = product::Entity::find()
            .filter(product::Column::Active.eq(true))
            .all(db)
            .await?;

        let mut report = InventoryValuationReport {
            product_count: products.len() as i64,
            low_stock_count: 0,
            out_of_stock_count: 0,
            total_cost_value: Decimal::ZERO,
            total_retail_value: Decimal::ZERO,
            products: Vec::with_capacity(products.len()),
        };

        for p in products {
            let stock = Decimal::from(p.stock);
            let cost_value = stock * p.cost;
            let retail_value = stock * p.price;
            report.total_cost_value += cost_value;
            report.total_retail_value += retail_value;
            if p.stock == 0 {
                report.out_of_stock_count += 1;
            } else if p.stock <= p.min_stock {
                report.low_stock_count += 1;
            }
            report.products.push(InventoryValuationRow {
                product_id: p.id,
                sku: p.sku,
                name: p.name,
                stock: p.stock,
                cost_value,
                retail_value,
            });
        }

        report
            .products
            .sort_by(|a, b| b.retail_value.cmp(&a.retail_value));
        Ok(report)
    }

    /// Per-customer revenue in the window, split into new versus returning.
    /// A customer is new when their first invoice ever falls inside the
    /// window.
    #[instrument(skip(self))]
    pub async fn customer_report(
        &self,
        window: ReportWindow,
    ) -> Result<CustomerReport, ServiceError> {
        let db = &*self.db_pool;
        let invoices = self.invoices_in_window(&window).await?;

        let mut rows: HashMap<Uuid, (i64, Decimal)> = HashMap::new();
        for inv in &invoices {
            let Some(customer_id) = inv.customer_id else {
                continue;
            };
            let entry = rows.entry(customer_id).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += inv.total_amount;
        }

        if rows.is_empty() {
            return Ok(CustomerReport {
                new_customers: 0,
                returning_customers: 0,
                customers: Vec::new(),
            });
        }

        let customer_ids: Vec<Uuid> = rows.keys().copied().collect();

        // Earliest invoice per customer across all time decides new vs
        // returning.
        let mut first_purchase: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let history: Vec<(Option<Uuid>, DateTime<Utc>)> = invoice::Entity::find()
            .filter(invoice::Column::CustomerId.is_in(customer_ids.clone()))
            .select_only()
            .column(invoice::Column::CustomerId)
            .column(invoice::Column::CreatedAt)
            .into_tuple()
            .all(db)
            .await?;
        for (customer_id, created_at) in history.into_iter() {
            let Some(customer_id) = customer_id else {
                continue;
            };
            first_purchase
                .entry(customer_id)
                .and_modify(|earliest| {
                    if created_at < *earliest {
                        *earliest = created_at;
                    }
                })
                .or_insert(created_at);
        }

        let names: HashMap<Uuid, (String, i32)> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(customer_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, (c.name, c.loyalty_points)))
            .collect();

        let mut new_customers = 0;
        let mut returning_customers = 0;
        let mut customers: Vec<CustomerRow> = rows
            .into_iter()
            .map(|(customer_id, (invoice_count, revenue))| {
                let first_in_window = first_purchase
                    .get(&customer_id)
                    .map(|first| *first >= window.from)
                    .unwrap_or(true);
                if first_in_window {
                    new_customers += 1;
                } else {
                    returning_customers += 1;
                }
                let (name, loyalty_points) = names
                    .get(&customer_id)
                    .cloned()
                    .unwrap_or_else(|| ("Unknown".to_string(), 0));
                CustomerRow {
                    customer_id,
                    name,
                    invoice_count,
                    revenue,
                    loyalty_points,
                    first_purchase_in_window: first_in_window,
                }
            })
            .collect();
        customers.sort_by(|a, b| b.revenue.cmp(&a.revenue));

        Ok(CustomerReport {
            new_customers,
            returning_customers,
            customers,
        })
    }
}
