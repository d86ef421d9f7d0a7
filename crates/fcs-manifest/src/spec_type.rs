use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PermissionError, PermissionResult};

/// Open Banking specification family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecType {
    Accounts,
    Payments,
    Funds,
    Notifications,
}

impl SpecType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Payments => "payments",
            Self::Funds => "funds",
            Self::Notifications => "notifications",
        }
    }

    /// Prefix of generated token names (`accountToken0001`).
    #[must_use]
    pub const fn token_prefix(self) -> &'static str {
        match self {
            Self::Accounts => "account",
            Self::Payments => "payment",
            Self::Funds => "funds",
            Self::Notifications => "notification",
        }
    }
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a specification by its published name.
///
/// # Errors
///
/// Returns [`PermissionError::UnknownSpecType`] for any other name.
pub fn get_spec_type(name: &str) -> PermissionResult<SpecType> {
    match name.trim() {
        "Account and Transaction API Specification" => Ok(SpecType::Accounts),
        "Payment Initiation API" => Ok(SpecType::Payments),
        "Confirmation of Funds API Specification" => Ok(SpecType::Funds),
        "Event Notification API Specification - ASPSP Endpoints" => Ok(SpecType::Notifications),
        other => Err(PermissionError::UnknownSpecType(other.to_string())),
    }
}
