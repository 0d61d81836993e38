//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Two Kinds of Functions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Repository structs (hold a SqlitePool)                                │
//! │  ├── PurchaseRepository::create / cancel / get_by_id / list            │
//! │  ├── SaleRepository::create / cancel / get_by_id / list / allocations  │
//! │  ├── InventoryRepository::list_by_business / get_by_id / *_price       │
//! │  └── CatalogRepository::create_business / ...                          │
//! │       │                                                                 │
//! │       │  pool.begin() → Transaction                                    │
//! │       ▼                                                                 │
//! │  Free functions (take &mut SqliteConnection)                           │
//! │  ├── inventory::resolve / create / increment / decrement ...           │
//! │  ├── lot::create / slices / apply_draw / apply_restore ...             │
//! │  └── price::create / fetch / update / delete / list_for_inventory      │
//! │                                                                         │
//! │  Every step of a unit of work runs on the transaction handle passed    │
//! │  in by its caller. No free function touches the pool.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Businesses, products, suppliers, customers
//! - [`InventoryRepository`](inventory::InventoryRepository) - Inventories with their lots and prices
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Stock-in and its reversal
//! - [`SaleRepository`](sale::SaleRepository) - Stock-out and its reversal

pub mod catalog;
pub mod inventory;
pub mod lot;
pub mod price;
pub mod purchase;
pub mod sale;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use stockroom_core::query::{Direction, OrderBy};
use stockroom_core::timestamp::{from_millis, from_millis_opt, to_millis};
use stockroom_core::{Money, ProductRef};

use crate::error::{DbError, DbResult};

// =============================================================================
// Shared Helpers
// =============================================================================

/// Current time truncated to what the database stores.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn decode_ts(table: &'static str, field: &str, millis: i64) -> DbResult<DateTime<Utc>> {
    from_millis(field, millis).map_err(|e| DbError::decode(table, e))
}

pub(crate) fn decode_ts_opt(
    table: &'static str,
    field: &str,
    millis: Option<i64>,
) -> DbResult<Option<DateTime<Utc>>> {
    from_millis_opt(field, millis).map_err(|e| DbError::decode(table, e))
}

pub(crate) fn decode_product(
    table: &'static str,
    business_product_id: Option<i64>,
    global_product_id: Option<i64>,
) -> DbResult<ProductRef> {
    ProductRef::from_ids(business_product_id, global_product_id, 0)
        .map_err(|e| DbError::decode(table, e))
}

// =============================================================================
// Listing Filters
// =============================================================================

/// A header table joined to its counterparty.
///
/// Listings read `FROM <table> h LEFT JOIN <party_table> party`, so every
/// header column is qualified with `h.` and the counterparty with `party.`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderTable {
    pub table: &'static str,
    pub party_table: &'static str,
    pub party_column: &'static str,
}

pub(crate) const PURCHASE_HEADERS: HeaderTable = HeaderTable {
    table: "purchases",
    party_table: "suppliers",
    party_column: "supplier_id",
};

pub(crate) const SALE_HEADERS: HeaderTable = HeaderTable {
    table: "sales",
    party_table: "customers",
    party_column: "customer_id",
};

impl HeaderTable {
    /// Starts `SELECT <columns> FROM <table> h LEFT JOIN ...`.
    pub fn select(&self, columns: &str) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!(
            "SELECT {} FROM {} h LEFT JOIN {} party ON party.id = h.{}",
            columns, self.table, self.party_table, self.party_column
        ))
    }
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// WHERE clause shared by the purchase and sale listings.
#[derive(Debug, Clone)]
pub(crate) struct HeaderFilter {
    pub headers: HeaderTable,
    pub business_id: i64,
    pub status: Option<&'static str>,
    pub party_id: Option<i64>,
    /// Case-insensitive substring of the counterparty name.
    pub party_name: Option<String>,
    pub total_amount: Option<Money>,
    pub created_from: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
}

impl HeaderFilter {
    pub fn new(headers: HeaderTable, business_id: i64) -> Self {
        HeaderFilter {
            headers,
            business_id,
            status: None,
            party_id: None,
            party_name: None,
            total_amount: None,
            created_from: None,
            updated_from: None,
        }
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE h.business_id = ").push_bind(self.business_id);

        if let Some(status) = self.status {
            qb.push(" AND h.status = ").push_bind(status);
        }
        if let Some(id) = self.party_id {
            qb.push(" AND h.")
                .push(self.headers.party_column)
                .push(" = ")
                .push_bind(id);
        }
        // SQLite's LIKE folds ASCII case
        if let Some(name) = self.party_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            qb.push(" AND party.name LIKE '%' || ")
                .push_bind(like_escape(name))
                .push(" || '%' ESCAPE '\\'");
        }
        if let Some(total) = self.total_amount {
            qb.push(" AND h.total_amount_cents = ").push_bind(total.cents());
        }
        if let Some(from) = self.created_from {
            qb.push(" AND h.created_at >= ").push_bind(to_millis(from));
        }
        if let Some(from) = self.updated_from {
            qb.push(" AND h.updated_at >= ").push_bind(to_millis(from));
        }
    }
}

/// Appends ORDER BY with `h.id` as tie-breaker, then LIMIT/OFFSET.
pub(crate) fn push_page(
    qb: &mut QueryBuilder<'_, Sqlite>,
    order_by: OrderBy,
    direction: Direction,
    limit: u32,
    offset: i64,
) {
    let table = if order_by.is_party() { "party." } else { "h." };
    qb.push(" ORDER BY ")
        .push(table)
        .push(order_by.column())
        .push(" ")
        .push(direction.as_sql())
        .push(", h.id ")
        .push(direction.as_sql());
    qb.push(" LIMIT ").push_bind(i64::from(limit));
    qb.push(" OFFSET ").push_bind(offset);
}
