use crate::{
    db::DbPool,
    entities::{customer, invoice, loyalty_history},
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(email(message = "Email must be valid"))]
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Materialized balance next to what the ledger says it should be.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyBalance {
    pub customer_id: Uuid,
    pub loyalty_points: i32,
    pub total_purchases: Decimal,
    pub ledger_points: i64,
    pub ledger_purchases: Decimal,
    pub in_sync: bool,
}

/// Service for customer records and the loyalty ledger.
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_customer(
        &self,
        user_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        if let Some(email) = &request.email {
            let taken = customer::Entity::find()
                .filter(customer::Column::Email.eq(email.clone()))
                .count(db)
                .await?;
            if taken > 0 {
                return Err(ServiceError::Conflict(format!(
                    "A customer with email {email} already exists"
                )));
            }
        }

        let now = Utc::now();
        let saved = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            email: Set(request.email),
            phone: Set(request.phone),
            loyalty_points: Set(0),
            total_purchases: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(db)
        .await?;

        audit::log_activity(db, user_id, "customer.create", "customer", saved.id, None).await?;

        info!(customer_id = %saved.id, "customer created");
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::CustomerCreated(saved.id)).await {
                warn!(error = %e, "failed to send domain event");
            }
        }
        Ok(saved)
    }

    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn update_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let existing = customer::Entity::find_by_id(customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {customer_id} not found")))?;

        let mut active: customer::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(email) = request.email {
            active.email = Set(Some(email));
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await?;
        audit::log_activity(db, user_id, "customer.update", "customer", customer_id, None).await?;
        Ok(updated)
    }

    /// Customers with purchase history cannot be deleted; their ledgers must
    /// stay reconcilable.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn delete_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        customer::Entity::find_by_id(customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {customer_id} not found")))?;

        let invoices = invoice::Entity::find()
            .filter(invoice::Column::CustomerId.eq(customer_id))
            .count(db)
            .await?;
        if invoices > 0 {
            return Err(ServiceError::Conflict(format!(
                "Customer {customer_id} has purchase history and cannot be deleted"
            )));
        }

        customer::Entity::delete_by_id(customer_id).exec(db).await?;
        audit::log_activity(db, user_id, "customer.delete", "customer", customer_id, None).await?;
        info!(customer_id = %customer_id, "customer deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<customer::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(customer::Entity::find_by_id(customer_id).one(db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        page: u64,
        limit: u64,
        search: Option<String>,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = customer::Entity::find().order_by_asc(customer::Column::Name);
        if let Some(needle) = search.filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", needle.trim());
            query = query.filter(
                customer::Column::Name
                    .like(pattern.clone())
                    .or(customer::Column::Email.like(pattern)),
            );
        }

        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let customers = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((customers, total))
    }

    /// Returns the materialized balance alongside the ledger sums.
    #[instrument(skip(self))]
    pub async fn loyalty_balance(
        &self,
        customer_id: Uuid,
    ) -> Result<LoyaltyBalance, ServiceError> {
        let db = &*self.db_pool;
        let customer = customer::Entity::find_by_id(customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {customer_id} not found")))?;

        let entries: Vec<(i32, Decimal)> = loyalty_history::Entity::find()
            .filter(loyalty_history::Column::CustomerId.eq(customer_id))
            .select_only()
            .column(loyalty_history::Column::DeltaPoints)
            .column(loyalty_history::Column::DeltaPurchases)
            .into_tuple()
            .all(db)
            .await?;

        let ledger_points: i64 = entries.iter().map(|(p, _)| *p as i64).sum();
        let ledger_purchases: Decimal = entries.iter().map(|(_, a)| *a).sum();
        let in_sync = ledger_points == customer.loyalty_points as i64
            && ledger_purchases == customer.total_purchases;

        Ok(LoyaltyBalance {
            customer_id,
            loyalty_points: customer.loyalty_points,
            total_purchases: customer.total_purchases,
            ledger_points,
            ledger_purchases,
            in_sync,
        })
    }

    /// Pages through a customer's loyalty ledger, newest first.
    #[instrument(skip(self))]
    pub async fn loyalty_ledger(
        &self,
        customer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<loyalty_history::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = loyalty_history::Entity::find()
            .filter(loyalty_history::Column::CustomerId.eq(customer_id))
            .order_by_desc(loyalty_history::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let entries = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((entries, total))
    }

    /// Rewrites the materialized balance from the ledger when they diverge.
    /// The ledger is the source of truth; no ledger row is written.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn reconcile_loyalty(
        &self,
        customer_id: Uuid,
    ) -> Result<LoyaltyBalance, ServiceError> {
        let balance = self.loyalty_balance(customer_id).await?;
        if balance.in_sync {
            return Ok(balance);
        }

        warn!(
            customer_id = %customer_id,
            stored_points = balance.loyalty_points,
            ledger_points = balance.ledger_points,
            "loyalty drift detected, repairing from ledger"
        );

        let db = &*self.db_pool;
        let customer = customer::Entity::find_by_id(customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {customer_id} not found")))?;
        let mut active: customer::ActiveModel = customer.into();
        active.loyalty_points = Set(balance.ledger_points as i32);
        active.total_purchases = Set(balance.ledger_purchases);
        active.updated_at = Set(Some(Utc::now()));
        active.update(db).await?;

        self.loyalty_balance(customer_id).await
    }
}
