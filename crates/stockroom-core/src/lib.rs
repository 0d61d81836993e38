//! # stockroom-core: Pure Ledger Logic for Stockroom
//!
//! Domain types and rules for the inventory ledger, as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP layer / jobs (out of tree)                    │   │
//! │  │    auth ──► business id ──► NewPurchase / NewSale / cancel     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │ validation│  │   │
//! │  │   │ Inventory │  │   Money   │  │ FIFO/LIFO │  │  orders   │  │   │
//! │  │   │ Lot, Sale │  │           │  │ policies  │  │  lines    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                stockroom-db (Database Layer)                    │   │
//! │  │       SQLite transactions, migrations, repositories             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Inventory, Lot, Purchase, Sale, ProductRef)
//! - [`money`] - Money type with integer arithmetic
//! - [`ledger`] - Lot ordering and restore/cancel policies
//! - [`query`] - Pagination, ordering and filters for listings
//! - [`validation`] - Request validation into orders
//! - [`timestamp`] - Epoch-millisecond conversions
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::ledger::{plan_draw, LotOrder, LotSlice};
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let lots = [LotSlice { lot_id: 1, entry_date: now, stock_quantity: 4 }];
//!
//! // Asking for more than the lots hold reports the shortfall
//! let plan = plan_draw(&lots, LotOrder::SALE_CONSUMPTION, 6);
//! assert_eq!(plan.shortfall, 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod query;
pub mod timestamp;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use stockroom_core::Money` instead of
// `use stockroom_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{PurchaseCancelFloor, SaleRestorePolicy};
pub use money::Money;
pub use query::{Direction, ListQuery, OrderBy, Page, PurchaseFilter, SaleFilter};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single purchase or sale.
pub const MAX_LINE_ITEMS: usize = 200;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches typos (an extra zero or two) before they inflate stock.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Maximum length of a lot number.
pub const MAX_LOT_NUMBER_LEN: usize = 100;

/// Page size when the caller does not pass one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// TypeScript Bindings
// =============================================================================

#[cfg(test)]
mod export_bindings {
    use super::*;
    use ts_rs::TS;

    /// `cargo test export_bindings` writes the .ts files to `bindings/`.
    #[test]
    fn export_bindings() {
        Money::export_all().unwrap();
        ProductRef::export_all().unwrap();
        InventoryWithLots::export_all().unwrap();
        PurchaseWithDetails::export_all().unwrap();
        SaleWithDetails::export_all().unwrap();
        SaleLotAllocation::export_all().unwrap();
        NewPurchase::export_all().unwrap();
        NewSale::export_all().unwrap();
        CancelOutcome::export_all().unwrap();
        PurchaseFilter::export_all().unwrap();
        SaleFilter::export_all().unwrap();
        NewInventoryPrice::export_all().unwrap();
        InventoryPriceUpdate::export_all().unwrap();
    }
}
