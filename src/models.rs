use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Invoice lifecycle. Transitions only move forward; VOIDED and REFUNDED
/// are terminal and reachable from PAID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Paid,
    PartiallyPaid,
    Voided,
    Refunded,
}

impl InvoiceStatus {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.parse()
            .map_err(|_| ServiceError::ValidationError(format!("Unknown invoice status: {raw}")))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Voided | Self::Refunded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.parse()
            .map_err(|_| ServiceError::ValidationError(format!("Unknown return status: {raw}")))
    }
}

/// Reason codes recorded on stock_history rows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StockReason {
    Purchase,
    Sale,
    Return,
    Adjustment,
}

/// Reason codes recorded on loyalty_history rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoyaltyReason {
    Accrual,
    Reversal,
    Refund,
    Reconcile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_status_round_trips_through_strings() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Paid,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Voided,
            InvoiceStatus::Refunded,
        ] {
            assert_eq!(InvoiceStatus::parse(&status.to_string()).unwrap(), status);
        }
        assert_eq!(InvoiceStatus::PartiallyPaid.to_string(), "PARTIALLY_PAID");
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        assert!(matches!(
            InvoiceStatus::parse("SHIPPED"),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn stock_reasons_serialize_lowercase() {
        assert_eq!(StockReason::Sale.to_string(), "sale");
        assert_eq!(StockReason::Adjustment.to_string(), "adjustment");
    }
}
