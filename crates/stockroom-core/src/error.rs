//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input rejected before any transaction          │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  ├── DbError          - Database operation failures                    │
//! │  ├── LedgerError      - CoreError | DbError, returned by units of work │
//! │  └── ApiError         - What the HTTP layer serializes                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → ApiError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::ProductRef;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Raised inside a unit of work; the transaction is rolled back before the
/// error reaches the caller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sale line names a product the business has never purchased.
    #[error("No inventory for product {product}; create initial stock or record a purchase first")]
    NoInventory { product: ProductRef },

    /// Aggregate stock check failed.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line: global-10 × 25
    ///      │
    ///      ▼
    /// Inventory.stock_quantity_total = 20
    ///      │
    ///      ▼
    /// InsufficientStock { product: global-10, available: 20, requested: 25 }
    ///      │
    ///      ▼
    /// Whole sale rolled back
    /// ```
    #[error("Insufficient stock for product {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: ProductRef,
        available: i64,
        requested: i64,
    },

    /// The aggregate allowed the sale but the lots could not cover it.
    ///
    /// Secondary check that catches drift between the aggregate and its lots.
    #[error("Insufficient lot stock for product {product}: requested {requested}, short by {shortfall}")]
    InsufficientLotStock {
        product: ProductRef,
        requested: i64,
        shortfall: i64,
    },

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(i64),

    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    /// Record is not in a state that allows the requested transition.
    ///
    /// ## When This Occurs
    /// - Canceling a sale that is already canceled
    #[error("{entity} {id} is {status}, cannot perform operation")]
    InvalidStatus {
        entity: &'static str,
        id: i64,
        status: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before a transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., unknown status, timestamp out of range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A line carries both a business product id and a global product id.
    #[error("line {line}: exactly one of business_product_id or global_product_id must be set, got both")]
    AmbiguousProduct { line: usize },

    /// A line carries neither product id.
    #[error("line {line}: exactly one of business_product_id or global_product_id must be set, got neither")]
    MissingProduct { line: usize },

    /// Referenced record does not exist or belongs to another business.
    #[error("{field} {id} does not belong to business {business_id}")]
    ForeignRecord {
        field: String,
        id: i64,
        business_id: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: ProductRef::Global(10),
            available: 20,
            requested: 25,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product global-10: available 20, requested 25"
        );

        let err = CoreError::NoInventory {
            product: ProductRef::Business(7),
        };
        assert!(err.to_string().starts_with("No inventory for product business-7"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "business_id".to_string(),
        };
        assert_eq!(err.to_string(), "business_id is required");

        let err = ValidationError::AmbiguousProduct { line: 2 };
        assert!(err.to_string().contains("got both"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MissingProduct { line: 0 };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
