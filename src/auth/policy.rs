//! Role policy. All authorization decisions go through [`allows`] so the
//! role contract lives in one place instead of being scattered per handler.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::ServiceError;

/// Staff roles, strictly ordered: ADMIN > MANAGER > CASHIER.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Cashier,
    Manager,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.parse()
            .map_err(|_| ServiceError::Unauthorized(format!("Unknown role: {raw}")))
    }
}

/// Every guarded operation in the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ProductRead,
    ProductWrite,
    StockAdjust,
    CustomerRead,
    CustomerCreate,
    CustomerWrite,
    InvoiceRead,
    InvoiceCreate,
    InvoiceVoid,
    ReturnRead,
    ReturnCreate,
    ReportRead,
    SettingsRead,
    SettingsWrite,
}

impl Action {
    /// Lowest role allowed to perform this action.
    fn floor(self) -> Role {
        match self {
            Action::ProductRead
            | Action::CustomerRead
            | Action::CustomerCreate
            | Action::InvoiceRead
            | Action::InvoiceCreate
            | Action::ReturnRead => Role::Cashier,
            Action::ProductWrite
            | Action::StockAdjust
            | Action::CustomerWrite
            | Action::InvoiceVoid
            | Action::ReturnCreate
            | Action::ReportRead
            | Action::SettingsRead => Role::Manager,
            Action::SettingsWrite => Role::Admin,
        }
    }
}

/// The single policy-evaluation point: may `role` perform `action`?
pub fn allows(role: Role, action: Action) -> bool {
    role >= action.floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_strictly_ordered() {
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::Cashier);
    }

    #[test]
    fn cashier_can_sell_but_not_void() {
        assert!(allows(Role::Cashier, Action::InvoiceCreate));
        assert!(allows(Role::Cashier, Action::ProductRead));
        assert!(!allows(Role::Cashier, Action::InvoiceVoid));
        assert!(!allows(Role::Cashier, Action::ReportRead));
        assert!(!allows(Role::Cashier, Action::StockAdjust));
    }

    #[test]
    fn manager_covers_everything_but_settings_writes() {
        assert!(allows(Role::Manager, Action::InvoiceVoid));
        assert!(allows(Role::Manager, Action::ReturnCreate));
        assert!(allows(Role::Manager, Action::ReportRead));
        assert!(!allows(Role::Manager, Action::SettingsWrite));
    }

    #[test]
    fn admin_is_unrestricted() {
        for action in [
            Action::ProductRead,
            Action::ProductWrite,
            Action::StockAdjust,
            Action::CustomerRead,
            Action::CustomerCreate,
            Action::CustomerWrite,
            Action::InvoiceRead,
            Action::InvoiceCreate,
            Action::InvoiceVoid,
            Action::ReturnRead,
            Action::ReturnCreate,
            Action::ReportRead,
            Action::SettingsRead,
            Action::SettingsWrite,
        ] {
            assert!(allows(Role::Admin, action));
        }
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse("manager").unwrap(), Role::Manager);
        assert_eq!(Role::parse("ADMIN").unwrap(), Role::Admin);
        assert!(Role::parse("intern").is_err());
    }
}
