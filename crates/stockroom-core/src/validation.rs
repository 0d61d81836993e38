//! # Validation Module
//!
//! Turns raw requests into validated orders before any transaction opens.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer (out of tree)                                     │
//! │  ├── Deserialization into NewPurchase / NewSale                        │
//! │  └── Business id from the authenticated context                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── ProductRef resolution (exactly one id per line)                   │
//! │  ├── Quantities, prices, lot dates                                     │
//! │  └── Line and order totals (overflow checked)                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (lot quantity >= 0, one product column)         │
//! │  ├── UNIQUE (business, product) per inventory                          │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::types::{NewSale, NewSaleLine, ProductRef};
//! use stockroom_core::validation::validate_new_sale;
//!
//! let sale = NewSale {
//!     business_id: 1,
//!     details: vec![NewSaleLine {
//!         global_product_id: Some(10),
//!         quantity: 3,
//!         price: Money::from_cents(250),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//! let order = validate_new_sale(&sale).unwrap();
//! assert_eq!(order.lines[0].product, ProductRef::Global(10));
//! assert_eq!(order.total_amount.cents(), 750);
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::money::Money;
use crate::query::ListQuery;
use crate::types::{
    InventoryPrice, NewInventoryPrice, NewPurchase, NewSale, ProductRef, PurchaseLine,
    PurchaseOrder, SaleLine, SaleOrder,
};
use crate::{MAX_LINE_ITEMS, MAX_LINE_QUANTITY, MAX_LOT_NUMBER_LEN, MAX_PAGE_SIZE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a surrogate id (business, supplier, customer, product).
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_id;
///
/// assert!(validate_id("business_id", 1).is_ok());
/// assert!(validate_id("business_id", 0).is_err());
/// ```
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a raw product id pair and resolves it to a [`ProductRef`].
pub fn validate_product(
    business_product_id: Option<i64>,
    global_product_id: Option<i64>,
    line: usize,
) -> ValidationResult<ProductRef> {
    let product = ProductRef::from_ids(business_product_id, global_product_id, line)?;
    validate_id(&format!("details[{}].{}", line, product.column()), product.id())?;
    Ok(product)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (samples, gifts)
///
/// ## Example
/// ```rust
/// use stockroom_core::money::Money;
/// use stockroom_core::validation::validate_price;
///
/// assert!(validate_price(Money::from_cents(1099)).is_ok());
/// assert!(validate_price(Money::zero()).is_ok());
/// assert!(validate_price(Money::from_cents(-100)).is_err());
/// ```
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates the number of lines in an order.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "details".to_string(),
        });
    }

    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "details".to_string(),
            min: 1,
            max: MAX_LINE_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates pagination parameters.
pub fn validate_page<F>(query: &ListQuery<F>) -> ValidationResult<()> {
    if query.page == 0 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }

    if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: i64::from(MAX_PAGE_SIZE),
        });
    }

    Ok(())
}

// =============================================================================
// Lot Validators
// =============================================================================

/// Normalises an optional lot number. Blank becomes `None`.
pub fn validate_lot_number(lot_number: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(raw) = lot_number else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > MAX_LOT_NUMBER_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "lot_number".to_string(),
            reason: format!("must be at most {} characters", MAX_LOT_NUMBER_LEN),
        });
    }
    Ok(Some(trimmed.to_string()))
}

/// Rejects a lot that expires before it entered stock.
pub fn validate_lot_dates(
    entry_date: Option<DateTime<Utc>>,
    expiration_date: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if let (Some(entry), Some(expiration)) = (entry_date, expiration_date) {
        if expiration < entry {
            return Err(ValidationError::InvalidFormat {
                field: "expiration_date".to_string(),
                reason: "must not be earlier than entry_date".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Price Validators
// =============================================================================

/// Rejects a window that closes before it opens.
pub fn validate_price_window(
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if valid_to.is_some_and(|to| to < valid_from) {
        return Err(ValidationError::InvalidFormat {
            field: "valid_to".to_string(),
            reason: "must not be earlier than valid_from".to_string(),
        });
    }
    Ok(())
}

/// Validates a new inventory price.
pub fn validate_new_price(input: &NewInventoryPrice) -> ValidationResult<()> {
    validate_id("inventory_id", input.inventory_id)?;
    validate_price(input.price)?;
    validate_price_window(input.valid_from, input.valid_to)
}

/// Validates a price after an update was merged into it.
pub fn validate_updated_price(price: &InventoryPrice) -> ValidationResult<()> {
    validate_price(price.price)?;
    validate_price_window(price.valid_from, price.valid_to)
}

// =============================================================================
// Order Validators
// =============================================================================

fn line_total(line: usize, price: Money, quantity: i64) -> ValidationResult<Money> {
    price
        .line_total(quantity)
        .ok_or_else(|| ValidationError::InvalidFormat {
            field: format!("details[{}].total_amount", line),
            reason: "amount overflows".to_string(),
        })
}

fn order_total(totals: impl Iterator<Item = Money>) -> ValidationResult<Money> {
    let mut sum = Money::zero();
    for total in totals {
        sum = sum
            .checked_add(total)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "total_amount".to_string(),
                reason: "amount overflows".to_string(),
            })?;
    }
    Ok(sum)
}

fn with_line(line: usize, err: ValidationError) -> ValidationError {
    match err {
        ValidationError::MustBePositive { field } => ValidationError::MustBePositive {
            field: format!("details[{}].{}", line, field),
        },
        ValidationError::OutOfRange { field, min, max } => ValidationError::OutOfRange {
            field: format!("details[{}].{}", line, field),
            min,
            max,
        },
        ValidationError::InvalidFormat { field, reason } => ValidationError::InvalidFormat {
            field: format!("details[{}].{}", line, field),
            reason,
        },
        other => other,
    }
}

/// Validates a create-purchase request.
///
/// Line totals are `price × quantity`; the purchase total is their sum.
/// A purchase cannot be created already canceled.
pub fn validate_new_purchase(input: &NewPurchase) -> ValidationResult<PurchaseOrder> {
    validate_id("business_id", input.business_id)?;
    if let Some(supplier_id) = input.supplier_id {
        validate_id("supplier_id", supplier_id)?;
    }

    let status = input.status.unwrap_or_default();
    if status.is_canceled() {
        return Err(ValidationError::InvalidFormat {
            field: "status".to_string(),
            reason: "a purchase cannot be created as canceled".to_string(),
        });
    }

    validate_line_count(input.details.len())?;

    let mut lines = Vec::with_capacity(input.details.len());
    for (i, raw) in input.details.iter().enumerate() {
        let product = validate_product(raw.business_product_id, raw.global_product_id, i)?;
        validate_quantity(raw.quantity).map_err(|e| with_line(i, e))?;
        validate_price(raw.price).map_err(|e| with_line(i, e))?;
        validate_lot_dates(raw.entry_date, raw.expiration_date).map_err(|e| with_line(i, e))?;
        let lot_number =
            validate_lot_number(raw.lot_number.as_deref()).map_err(|e| with_line(i, e))?;

        lines.push(PurchaseLine {
            product,
            quantity: raw.quantity,
            price: raw.price,
            total_amount: line_total(i, raw.price, raw.quantity)?,
            lot_number,
            entry_date: raw.entry_date,
            expiration_date: raw.expiration_date,
        });
    }

    let total_amount = order_total(lines.iter().map(|l| l.total_amount))?;

    Ok(PurchaseOrder {
        business_id: input.business_id,
        supplier_id: input.supplier_id,
        status,
        total_amount,
        lines,
    })
}

/// Validates a create-sale request.
pub fn validate_new_sale(input: &NewSale) -> ValidationResult<SaleOrder> {
    validate_id("business_id", input.business_id)?;
    if let Some(customer_id) = input.customer_id {
        validate_id("customer_id", customer_id)?;
    }

    let status = input.status.unwrap_or_default();
    if status.is_canceled() {
        return Err(ValidationError::InvalidFormat {
            field: "status".to_string(),
            reason: "a sale cannot be created as canceled".to_string(),
        });
    }

    validate_line_count(input.details.len())?;

    let mut lines = Vec::with_capacity(input.details.len());
    for (i, raw) in input.details.iter().enumerate() {
        let product = validate_product(raw.business_product_id, raw.global_product_id, i)?;
        validate_quantity(raw.quantity).map_err(|e| with_line(i, e))?;
        validate_price(raw.price).map_err(|e| with_line(i, e))?;

        lines.push(SaleLine {
            product,
            quantity: raw.quantity,
            price: raw.price,
            total_amount: line_total(i, raw.price, raw.quantity)?,
        });
    }

    let total_amount = order_total(lines.iter().map(|l| l.total_amount))?;

    Ok(SaleOrder {
        business_id: input.business_id,
        customer_id: input.customer_id,
        status,
        total_amount,
        lines,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
