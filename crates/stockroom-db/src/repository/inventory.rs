//! # Inventory Repository
//!
//! The per (business, product) running stock total.
//!
//! ## Aggregate vs Lots
//! ```text
//! inventories.stock_quantity_total   ← authoritative, checked by sales
//!        │ 1
//!        │
//!        ▼ n
//! lots.stock_quantity                ← batch breakdown, FIFO/LIFO walks
//! ```
//! Both are updated in the same transaction but neither is derived from the
//! other, so they may drift (purchase cancel after a sale, lot shortfalls).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::timestamp::to_millis;
use stockroom_core::validation::{validate_id, validate_new_price, validate_updated_price};
use stockroom_core::{
    Inventory, InventoryPrice, InventoryPriceUpdate, InventoryWithLots, NewInventoryPrice,
    ProductRef,
};
use tracing::{debug, info};

use super::{decode_product, decode_ts, lot, now, price};
use crate::error::{DbError, DbResult, LedgerResult};

const TABLE: &str = "inventories";

const COLUMNS: &str = "id, business_id, business_product_id, global_product_id, \
                       stock_quantity_total, created_at, updated_at";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    id: i64,
    business_id: i64,
    business_product_id: Option<i64>,
    global_product_id: Option<i64>,
    stock_quantity_total: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<InventoryRow> for Inventory {
    type Error = DbError;

    fn try_from(row: InventoryRow) -> DbResult<Self> {
        Ok(Inventory {
            id: row.id,
            business_id: row.business_id,
            product: decode_product(TABLE, row.business_product_id, row.global_product_id)?,
            stock_quantity_total: row.stock_quantity_total,
            created_at: decode_ts(TABLE, "created_at", row.created_at)?,
            updated_at: decode_ts(TABLE, "updated_at", row.updated_at)?,
        })
    }
}

// =============================================================================
// Transaction Steps
// =============================================================================

/// Finds the inventory for `product` in `business_id`.
///
/// Matches on the one product column the reference names, never on either.
pub async fn resolve(
    conn: &mut SqliteConnection,
    business_id: i64,
    product: ProductRef,
) -> DbResult<Option<Inventory>> {
    let sql = format!(
        "SELECT {} FROM inventories WHERE business_id = ?1 AND {} = ?2",
        COLUMNS,
        product.column()
    );
    let row: Option<InventoryRow> = sqlx::query_as(&sql)
        .bind(business_id)
        .bind(product.id())
        .fetch_optional(conn)
        .await?;

    row.map(Inventory::try_from).transpose()
}

/// Creates an inventory holding `quantity`.
pub async fn create(
    conn: &mut SqliteConnection,
    business_id: i64,
    product: ProductRef,
    quantity: i64,
    at: DateTime<Utc>,
) -> DbResult<Inventory> {
    let id = sqlx::query(
        r#"
        INSERT INTO inventories (
            business_id, business_product_id, global_product_id,
            stock_quantity_total, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(business_id)
    .bind(product.business_product_id())
    .bind(product.global_product_id())
    .bind(quantity)
    .bind(to_millis(at))
    .execute(conn)
    .await?
    .last_insert_rowid();

    debug!(inventory_id = id, business_id, %product, quantity, "Created inventory");

    Ok(Inventory {
        id,
        business_id,
        product,
        stock_quantity_total: quantity,
        created_at: at,
        updated_at: at,
    })
}

/// Adds `quantity` to the total.
pub async fn increment(
    conn: &mut SqliteConnection,
    inventory_id: i64,
    quantity: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE inventories SET stock_quantity_total = stock_quantity_total + ?1, updated_at = ?2 \
         WHERE id = ?3",
    )
    .bind(quantity)
    .bind(to_millis(at))
    .bind(inventory_id)
    .execute(conn)
    .await?;

    debug!(inventory_id, quantity, "Incremented inventory");
    Ok(())
}

/// Subtracts `quantity` only if the total covers it.
///
/// Returns `false` and changes nothing when it does not.
pub async fn decrement_guarded(
    conn: &mut SqliteConnection,
    inventory_id: i64,
    quantity: i64,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE inventories SET stock_quantity_total = stock_quantity_total - ?1, updated_at = ?2 \
         WHERE id = ?3 AND stock_quantity_total >= ?1",
    )
    .bind(quantity)
    .bind(to_millis(at))
    .bind(inventory_id)
    .execute(conn)
    .await?;

    let applied = result.rows_affected() == 1;
    debug!(inventory_id, quantity, applied, "Guarded inventory decrement");
    Ok(applied)
}

/// Subtracts `quantity` unconditionally and returns the new total, which
/// may be negative.
pub async fn decrement(
    conn: &mut SqliteConnection,
    inventory_id: i64,
    quantity: i64,
    at: DateTime<Utc>,
) -> DbResult<i64> {
    sqlx::query(
        "UPDATE inventories SET stock_quantity_total = stock_quantity_total - ?1, updated_at = ?2 \
         WHERE id = ?3",
    )
    .bind(quantity)
    .bind(to_millis(at))
    .bind(inventory_id)
    .execute(&mut *conn)
    .await?;

    let total = stock_total(conn, inventory_id).await?;
    debug!(inventory_id, quantity, total, "Decremented inventory");
    Ok(total)
}

/// Current total of one inventory.
pub async fn stock_total(conn: &mut SqliteConnection, inventory_id: i64) -> DbResult<i64> {
    sqlx::query_scalar("SELECT stock_quantity_total FROM inventories WHERE id = ?1")
        .bind(inventory_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Inventory", inventory_id))
}

// =============================================================================
// Read Side
// =============================================================================

/// Repository for inventory reads and the inventory price list.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Every inventory of a business with its lots and prices, newest
    /// inventory first.
    pub async fn list_by_business(&self, business_id: i64) -> DbResult<Vec<InventoryWithLots>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            "SELECT {} FROM inventories WHERE business_id = ?1 ORDER BY created_at DESC, id DESC",
            COLUMNS
        );
        let rows: Vec<InventoryRow> = sqlx::query_as(&sql)
            .bind(business_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let inventory = Inventory::try_from(row)?;
            let lots = lot::list_for_inventory(&mut conn, inventory.id).await?;
            let prices = price::list_for_inventory(&mut conn, inventory.id).await?;
            result.push(InventoryWithLots {
                inventory,
                lots,
                prices,
            });
        }

        debug!(business_id, count = result.len(), "Listed inventories");
        Ok(result)
    }

    /// One inventory with its lots and prices.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<InventoryWithLots>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!("SELECT {} FROM inventories WHERE id = ?1", COLUMNS);
        let row: Option<InventoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let inventory = Inventory::try_from(row)?;
        let lots = lot::list_for_inventory(&mut conn, inventory.id).await?;
        let prices = price::list_for_inventory(&mut conn, inventory.id).await?;
        Ok(Some(InventoryWithLots {
            inventory,
            lots,
            prices,
        }))
    }

    /// The inventory for one product of a business, if it was ever purchased.
    pub async fn find(&self, business_id: i64, product: ProductRef) -> DbResult<Option<Inventory>> {
        let mut conn = self.pool.acquire().await?;
        resolve(&mut conn, business_id, product).await
    }

    // =========================================================================
    // Prices
    // =========================================================================

    /// Adds a price to an inventory.
    ///
    /// ## Errors
    /// - `Validation` for a negative price or a window closing before it opens
    /// - `NotFound` when the inventory does not exist
    pub async fn create_price(&self, input: &NewInventoryPrice) -> LedgerResult<InventoryPrice> {
        validate_new_price(input)?;

        let mut conn = self.pool.acquire().await?;
        let created = price::create(&mut conn, input, now())
            .await?
            .ok_or_else(|| DbError::not_found("Inventory", input.inventory_id))?;

        info!(
            price_id = created.id,
            inventory_id = created.inventory_id,
            price_type = %created.price_type,
            price = created.price.cents(),
            "Inventory price created"
        );
        Ok(created)
    }

    /// Applies a partial update and returns the stored price.
    ///
    /// The merged price is validated as a whole, so moving only `valid_from`
    /// past an existing `valid_to` is rejected.
    pub async fn update_price(
        &self,
        id: i64,
        update: &InventoryPriceUpdate,
    ) -> LedgerResult<InventoryPrice> {
        validate_id("id", id)?;

        let mut conn = self.pool.acquire().await?;
        let current = price::fetch(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryPrice", id))?;

        let updated = current.updated(update);
        validate_updated_price(&updated)?;

        if !price::update(&mut conn, &updated).await? {
            return Err(DbError::not_found("InventoryPrice", id).into());
        }

        info!(price_id = id, inventory_id = updated.inventory_id, "Inventory price updated");
        Ok(updated)
    }

    /// Removes a price.
    pub async fn delete_price(&self, id: i64) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await?;
        if !price::delete(&mut conn, id).await? {
            return Err(DbError::not_found("InventoryPrice", id).into());
        }

        info!(price_id = id, "Inventory price deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
