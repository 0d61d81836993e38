//! # List Queries
//!
//! Pagination, ordering and filters for the purchase and sale listings.
//!
//! ```text
//! ListQuery { page: 2, limit: 10, order_by: created_at, direction: desc, filter }
//!      │
//!      ▼  (stockroom-db builds WHERE / ORDER BY / LIMIT / OFFSET)
//! Page { data: [..10 rows..], total: 27, page: 2, last_page: 3 }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{PurchaseStatus, SaleStatus};
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

// =============================================================================
// Ordering
// =============================================================================

/// Sortable header columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    TotalAmount,
    Status,
    /// Supplier name for purchases, customer name for sales.
    /// Headers without a party sort as NULL.
    #[serde(alias = "supplier_name", alias = "customer_name")]
    PartyName,
}

impl OrderBy {
    /// Column name, safe to splice into SQL.
    ///
    /// `PartyName` names the column of the joined supplier or customer row;
    /// every other variant is a header column.
    pub const fn column(&self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "created_at",
            OrderBy::UpdatedAt => "updated_at",
            OrderBy::TotalAmount => "total_amount_cents",
            OrderBy::Status => "status",
            OrderBy::PartyName => "name",
        }
    }

    pub const fn is_party(&self) -> bool {
        matches!(self, OrderBy::PartyName)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Purchase listing filters. Every field is optional and they combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseFilter {
    #[serde(default)]
    pub status: Option<PurchaseStatus>,
    #[serde(default)]
    pub supplier_id: Option<i64>,
    /// Case-insensitive substring of the supplier's name.
    #[serde(default)]
    pub supplier_name: Option<String>,
    /// Exact match.
    #[serde(default)]
    pub total_amount: Option<Money>,
    /// Inclusive lower bound.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub updated_from: Option<DateTime<Utc>>,
}

/// Sale listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleFilter {
    #[serde(default)]
    pub status: Option<SaleStatus>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    /// Case-insensitive substring of the customer's name.
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub updated_from: Option<DateTime<Utc>>,
}

// =============================================================================
// List Query
// =============================================================================

/// A page request. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ListQuery<F> {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub filter: F,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl<F: Default> Default for ListQuery<F> {
    fn default() -> Self {
        ListQuery {
            page: default_page(),
            limit: default_limit(),
            order_by: OrderBy::default(),
            direction: Direction::default(),
            filter: F::default(),
        }
    }
}

impl<F> ListQuery<F> {
    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    /// Builder: select a page.
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// Builder: set ordering.
    pub fn order(mut self, order_by: OrderBy, direction: Direction) -> Self {
        self.order_by = order_by;
        self.direction = direction;
        self
    }

    /// Builder: set filters.
    pub fn filter(mut self, filter: F) -> Self {
        self.filter = filter;
        self
    }
}

pub type PurchaseQuery = ListQuery<PurchaseFilter>;
pub type SaleQuery = ListQuery<SaleFilter>;

// =============================================================================
// Page
// =============================================================================

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Rows matching the filters across all pages.
    pub total: i64,
    pub page: u32,
    /// `ceil(total / limit)`; 0 when nothing matched.
    pub last_page: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, limit: u32) -> Self {
        let limit = i64::from(limit.clamp(1, MAX_PAGE_SIZE));
        Page {
            data,
            total,
            page,
            last_page: (total + limit - 1) / limit,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
