pub mod customers;
pub mod health;
pub mod invoices;
pub mod products;
pub mod reports;
pub mod returns;
pub mod settings;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub invoices: Arc<crate::services::invoices::InvoiceService>,
    pub returns: Arc<crate::services::returns::ReturnService>,
    pub products: Arc<crate::services::products::ProductService>,
    pub customers: Arc<crate::services::customers::CustomerService>,
    pub reports: Arc<crate::services::reports::ReportService>,
    pub settings: Arc<crate::services::settings::SettingsService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let invoices = Arc::new(crate::services::invoices::InvoiceService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let returns = Arc::new(crate::services::returns::ReturnService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let products = Arc::new(crate::services::products::ProductService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let customers = Arc::new(crate::services::customers::CustomerService::new(
            db_pool.clone(),
            Some(event_sender),
        ));
        let reports = Arc::new(crate::services::reports::ReportService::new(db_pool.clone()));
        let settings = Arc::new(crate::services::settings::SettingsService::new(db_pool));

        Self {
            invoices,
            returns,
            products,
            customers,
            reports,
            settings,
        }
    }
}
