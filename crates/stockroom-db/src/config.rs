//! Ledger configuration.
//!
//! Loaded from environment variables with fallback to defaults.
//!
//! | Variable                          | Values                         | Default          |
//! |-----------------------------------|--------------------------------|------------------|
//! | `STOCKROOM_SALE_RESTORE_POLICY`   | `newest_lot`, `consumed_lots`  | `newest_lot`     |
//! | `STOCKROOM_PURCHASE_CANCEL_FLOOR` | `allow_negative`, `reject`     | `allow_negative` |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use stockroom_core::{PurchaseCancelFloor, SaleRestorePolicy};

pub const SALE_RESTORE_POLICY_VAR: &str = "STOCKROOM_SALE_RESTORE_POLICY";
pub const PURCHASE_CANCEL_FLOOR_VAR: &str = "STOCKROOM_PURCHASE_CANCEL_FLOOR";

/// Policies applied by the purchase and sale units of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Where a canceled sale's stock goes back to.
    pub sale_restore_policy: SaleRestorePolicy,

    /// Whether canceling a purchase may take the aggregate below zero.
    pub purchase_cancel_floor: PurchaseCancelFloor,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LedgerConfig {
            sale_restore_policy: parse_env(SALE_RESTORE_POLICY_VAR, SaleRestorePolicy::default())?,
            purchase_cancel_floor: parse_env(
                PURCHASE_CANCEL_FLOOR_VAR,
                PurchaseCancelFloor::default(),
            )?,
        })
    }

    pub fn sale_restore_policy(mut self, policy: SaleRestorePolicy) -> Self {
        self.sale_restore_policy = policy;
        self
    }

    pub fn purchase_cancel_floor(mut self, floor: PurchaseCancelFloor) -> Self {
        self.purchase_cancel_floor = floor;
        self
    }
}

/// Parses `var` if set and non-blank, otherwise returns `default`.
pub(crate) fn parse_env<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        _ => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
