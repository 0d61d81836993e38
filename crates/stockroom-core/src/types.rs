//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Inventory     │ 1 │      Lot        │   │   ProductRef    │       │
//! │  │  ─────────────  │──►│  ─────────────  │   │  ─────────────  │       │
//! │  │  business_id    │ n │  entry_date     │   │  Business(id)   │       │
//! │  │  product        │   │  expiration     │   │  Global(id)     │       │
//! │  │  stock_total    │   │  stock_quantity │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Purchase      │ 1 │ PurchaseDetail  │   │ PurchaseStatus  │       │
//! │  │  supplier_id?   │──►│  product, qty   │   │ SaleStatus      │       │
//! │  │  total_amount   │ n │  price, total   │   │  pending ...    │       │
//! │  └─────────────────┘   └─────────────────┘   │  canceled       │       │
//! │  ┌─────────────────┐   ┌─────────────────┐   └─────────────────┘       │
//! │  │     Sale        │ 1 │   SaleDetail    │ 1 ┌─────────────────┐       │
//! │  │  customer_id?   │──►│  product, qty   │──►│ SaleLotAlloc.   │       │
//! │  │  total_amount   │ n │  price, total   │ n │  lot_id, qty    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timestamps
//! Every timestamp crosses the API boundary as epoch milliseconds, the same
//! integer the database stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product Reference
// =============================================================================

/// Identifies the product an inventory, detail or line refers to.
///
/// A product is either private to one business or shared through the
/// global catalog, never both.
///
/// ## Wire Form
/// ```text
/// { "business_product_id": 7,    "global_product_id": null }  → Business(7)
/// { "business_product_id": null, "global_product_id": 10   }  → Global(10)
/// both set / neither set                                       → ValidationError
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    /// A product from the business's own catalog.
    Business(i64),
    /// A product from the shared global catalog.
    Global(i64),
}

impl ProductRef {
    /// Builds a reference from the raw pair of nullable ids.
    ///
    /// `line` is only used to point the error at the offending input line.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::types::ProductRef;
    ///
    /// assert_eq!(ProductRef::from_ids(Some(7), None, 0).unwrap(), ProductRef::Business(7));
    /// assert_eq!(ProductRef::from_ids(None, Some(10), 0).unwrap(), ProductRef::Global(10));
    /// assert!(ProductRef::from_ids(Some(7), Some(10), 0).is_err());
    /// assert!(ProductRef::from_ids(None, None, 0).is_err());
    /// ```
    pub fn from_ids(
        business_product_id: Option<i64>,
        global_product_id: Option<i64>,
        line: usize,
    ) -> Result<Self, ValidationError> {
        match (business_product_id, global_product_id) {
            (Some(id), None) => Ok(ProductRef::Business(id)),
            (None, Some(id)) => Ok(ProductRef::Global(id)),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousProduct { line }),
            (None, None) => Err(ValidationError::MissingProduct { line }),
        }
    }

    /// The referenced id, whichever catalog it lives in.
    #[inline]
    pub const fn id(&self) -> i64 {
        match self {
            ProductRef::Business(id) | ProductRef::Global(id) => *id,
        }
    }

    #[inline]
    pub const fn business_product_id(&self) -> Option<i64> {
        match self {
            ProductRef::Business(id) => Some(*id),
            ProductRef::Global(_) => None,
        }
    }

    #[inline]
    pub const fn global_product_id(&self) -> Option<i64> {
        match self {
            ProductRef::Global(id) => Some(*id),
            ProductRef::Business(_) => None,
        }
    }

    /// Name of the column holding this kind of product id.
    #[inline]
    pub const fn column(&self) -> &'static str {
        match self {
            ProductRef::Business(_) => "business_product_id",
            ProductRef::Global(_) => "global_product_id",
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductRef::Business(id) => write!(f, "business-{}", id),
            ProductRef::Global(id) => write!(f, "global-{}", id),
        }
    }
}

// =============================================================================
// Inventory & Lots
// =============================================================================

/// Running stock total for one product in one business.
///
/// Created on the first purchase of the product and never deleted. The
/// total is authoritative; it is updated alongside its lots but not derived
/// from them, so the two may drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Inventory {
    pub id: i64,
    pub business_id: i64,
    pub product: ProductRef,
    pub stock_quantity_total: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,
}

/// One received batch of an inventory. Every purchase detail creates one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Lot {
    pub id: i64,
    pub inventory_id: i64,
    pub lot_number: Option<String>,
    /// Drives FIFO/LIFO ordering.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub entry_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Never negative.
    pub stock_quantity: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,
}

/// An inventory together with its lots, oldest lot first, and its prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryWithLots {
    #[serde(flatten)]
    pub inventory: Inventory,
    pub lots: Vec<Lot>,
    #[serde(default)]
    pub prices: Vec<InventoryPrice>,
}

impl InventoryWithLots {
    /// Sum of lot quantities. Equal to the aggregate unless they drifted.
    pub fn lot_total(&self) -> i64 {
        self.lots.iter().map(|lot| lot.stock_quantity).sum()
    }
}

// =============================================================================
// Inventory Prices
// =============================================================================

/// Whether a price is charged to customers or paid to suppliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    #[serde(alias = "SALE")]
    Sale,
    #[serde(alias = "BUY")]
    Buy,
}

impl PriceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PriceType::Sale => "sale",
            PriceType::Buy => "buy",
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sale" => Ok(PriceType::Sale),
            "buy" => Ok(PriceType::Buy),
            other => Err(ValidationError::InvalidFormat {
                field: "price_type".to_string(),
                reason: format!("unknown price type '{}'", other),
            }),
        }
    }
}

/// A price of an inventory over `[valid_from, valid_to]`.
///
/// Informational: purchases and sales carry their own line prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryPrice {
    pub id: i64,
    pub inventory_id: i64,
    pub price_type: PriceType,
    pub price: Money,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub valid_from: DateTime<Utc>,
    /// `None` is open-ended.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,
}

impl InventoryPrice {
    /// True when `at` falls inside the validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.valid_from && self.valid_to.map_or(true, |to| at <= to)
    }

    /// The price after `update`, fields left `None` unchanged.
    pub fn updated(&self, update: &InventoryPriceUpdate) -> InventoryPrice {
        InventoryPrice {
            price_type: update.price_type.unwrap_or(self.price_type),
            price: update.price.unwrap_or(self.price),
            valid_from: update.valid_from.unwrap_or(self.valid_from),
            valid_to: update.valid_to.or(self.valid_to),
            ..self.clone()
        }
    }
}

/// Request to add a price to an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewInventoryPrice {
    pub inventory_id: i64,
    pub price_type: PriceType,
    pub price: Money,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub valid_from: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub valid_to: Option<DateTime<Utc>>,
}

/// Partial update of a price. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryPriceUpdate {
    #[serde(default)]
    pub price_type: Option<PriceType>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub valid_to: Option<DateTime<Utc>>,
}

// =============================================================================
// Statuses
// =============================================================================

/// Lifecycle of a purchase.
///
/// `Canceled` is never persisted: a canceled purchase is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Ordered, stock already counted in.
    Pending,
    /// Goods received.
    Received,
    /// Terminal.
    #[serde(alias = "cancelled")]
    Canceled,
}

impl PurchaseStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Canceled => "canceled",
        }
    }

    #[inline]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, PurchaseStatus::Canceled)
    }
}

impl Default for PurchaseStatus {
    fn default() -> Self {
        PurchaseStatus::Pending
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "received" => Ok(PurchaseStatus::Received),
            "canceled" | "cancelled" => Ok(PurchaseStatus::Canceled),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown purchase status '{}'", other),
            }),
        }
    }
}

/// Lifecycle of a sale.
///
/// A canceled sale stays in the table; its stock has been given back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Recorded, awaiting payment or delivery.
    Pending,
    /// Paid and delivered.
    Completed,
    /// Terminal. Stock was restored.
    #[serde(alias = "cancelled")]
    Canceled,
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Canceled => "canceled",
        }
    }

    #[inline]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, SaleStatus::Canceled)
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SaleStatus::Pending),
            "completed" => Ok(SaleStatus::Completed),
            "canceled" | "cancelled" => Ok(SaleStatus::Canceled),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown sale status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// Purchase header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Purchase {
    pub id: i64,
    pub business_id: i64,
    pub supplier_id: Option<i64>,
    /// Sum of detail totals.
    pub total_amount: Money,
    pub status: PurchaseStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,
}

/// One purchased product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseDetail {
    pub id: i64,
    pub purchase_id: i64,
    pub product: ProductRef,
    pub quantity: i64,
    /// Unit price.
    pub price: Money,
    /// `price × quantity`.
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseWithDetails {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub details: Vec<PurchaseDetail>,
}

// =============================================================================
// Sale
// =============================================================================

/// Sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub business_id: i64,
    pub customer_id: Option<i64>,
    pub total_amount: Money,
    pub status: SaleStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetail {
    pub id: i64,
    pub sale_id: i64,
    pub product: ProductRef,
    pub quantity: i64,
    pub price: Money,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleWithDetails {
    #[serde(flatten)]
    pub sale: Sale,
    pub details: Vec<SaleDetail>,
}

/// How much of one lot a sale detail consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLotAllocation {
    pub id: i64,
    pub sale_detail_id: i64,
    pub lot_id: i64,
    pub quantity: i64,
}

// =============================================================================
// Inputs (wire form)
// =============================================================================

/// Create-purchase request as the HTTP layer receives it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchase {
    pub business_id: i64,
    #[serde(default)]
    pub supplier_id: Option<i64>,
    /// Defaults to `pending`.
    #[serde(default)]
    pub status: Option<PurchaseStatus>,
    #[serde(alias = "purchaseDetails", alias = "purchase_details")]
    pub details: Vec<NewPurchaseLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchaseLine {
    #[serde(default)]
    pub business_product_id: Option<i64>,
    #[serde(default)]
    pub global_product_id: Option<i64>,
    pub quantity: i64,
    pub price: Money,
    #[serde(default)]
    pub lot_number: Option<String>,
    /// Defaults to the time of the purchase.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub entry_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Create-sale request as the HTTP layer receives it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub business_id: i64,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub status: Option<SaleStatus>,
    #[serde(alias = "saleDetails", alias = "sale_details")]
    pub details: Vec<NewSaleLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleLine {
    #[serde(default)]
    pub business_product_id: Option<i64>,
    #[serde(default)]
    pub global_product_id: Option<i64>,
    pub quantity: i64,
    pub price: Money,
}

// =============================================================================
// Validated Orders
// =============================================================================
// Produced by `validation::validate_new_purchase` / `validate_new_sale`.
// Repositories only accept these, so raw input never reaches a transaction.

/// A purchase line that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseLine {
    pub product: ProductRef,
    pub quantity: i64,
    pub price: Money,
    pub total_amount: Money,
    pub lot_number: Option<String>,
    /// `None` means "when the purchase is recorded".
    pub entry_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    pub business_id: i64,
    pub supplier_id: Option<i64>,
    pub status: PurchaseStatus,
    pub total_amount: Money,
    pub lines: Vec<PurchaseLine>,
}

/// A sale line that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLine {
    pub product: ProductRef,
    pub quantity: i64,
    pub price: Money,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleOrder {
    pub business_id: i64,
    pub customer_id: Option<i64>,
    pub status: SaleStatus,
    pub total_amount: Money,
    pub lines: Vec<SaleLine>,
}

// =============================================================================
// Cancel Outcome
// =============================================================================

/// Confirmation returned by the cancel operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancelOutcome {
    pub id: i64,
    pub message: String,
}

impl CancelOutcome {
    pub fn purchase(id: i64) -> Self {
        CancelOutcome {
            id,
            message: "Purchase canceled and stock reverted".to_string(),
        }
    }

    pub fn sale(id: i64) -> Self {
        CancelOutcome {
            id,
            message: "Sale canceled and stock restored".to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
