//! # Inventory Price Steps
//!
//! Sale and buy prices attached to an inventory. They are read alongside the
//! lots and never consulted by the purchase or sale units of work.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockroom_core::timestamp::to_millis;
use stockroom_core::{InventoryPrice, Money, NewInventoryPrice, PriceType};
use tracing::debug;

use super::{decode_ts, decode_ts_opt};
use crate::error::{DbError, DbResult};

const TABLE: &str = "inventory_prices";

const COLUMNS: &str = "id, inventory_id, price_type, price_cents, valid_from, valid_to, created_at";

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    id: i64,
    inventory_id: i64,
    price_type: PriceType,
    price_cents: i64,
    valid_from: i64,
    valid_to: Option<i64>,
    created_at: i64,
}

impl TryFrom<PriceRow> for InventoryPrice {
    type Error = DbError;

    fn try_from(row: PriceRow) -> DbResult<Self> {
        Ok(InventoryPrice {
            id: row.id,
            inventory_id: row.inventory_id,
            price_type: row.price_type,
            price: Money::from_cents(row.price_cents),
            valid_from: decode_ts(TABLE, "valid_from", row.valid_from)?,
            valid_to: decode_ts_opt(TABLE, "valid_to", row.valid_to)?,
            created_at: decode_ts(TABLE, "created_at", row.created_at)?,
        })
    }
}

/// Inserts a price for an existing inventory.
///
/// Returns `None` without writing when the inventory does not exist.
pub async fn create(
    conn: &mut SqliteConnection,
    price: &NewInventoryPrice,
    at: DateTime<Utc>,
) -> DbResult<Option<InventoryPrice>> {
    // INSERT .. SELECT keeps the existence check and the write in one statement
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_prices (
            inventory_id, price_type, price_cents, valid_from, valid_to, created_at
        )
        SELECT id, ?2, ?3, ?4, ?5, ?6 FROM inventories WHERE id = ?1
        "#,
    )
    .bind(price.inventory_id)
    .bind(price.price_type)
    .bind(price.price.cents())
    .bind(to_millis(price.valid_from))
    .bind(price.valid_to.map(to_millis))
    .bind(to_millis(at))
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let id = result.last_insert_rowid();
    debug!(price_id = id, inventory_id = price.inventory_id, price_type = %price.price_type, "Created price");

    Ok(Some(InventoryPrice {
        id,
        inventory_id: price.inventory_id,
        price_type: price.price_type,
        price: price.price,
        valid_from: price.valid_from,
        valid_to: price.valid_to,
        created_at: at,
    }))
}

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<InventoryPrice>> {
    let sql = format!("SELECT {} FROM inventory_prices WHERE id = ?1", COLUMNS);
    let row: Option<PriceRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;
    row.map(InventoryPrice::try_from).transpose()
}

/// Writes every mutable field of `price`. Returns `false` if the row is gone.
pub async fn update(conn: &mut SqliteConnection, price: &InventoryPrice) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE inventory_prices SET price_type = ?1, price_cents = ?2, valid_from = ?3, \
         valid_to = ?4 WHERE id = ?5",
    )
    .bind(price.price_type)
    .bind(price.price.cents())
    .bind(to_millis(price.valid_from))
    .bind(price.valid_to.map(to_millis))
    .bind(price.id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns `false` if there was nothing to delete.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM inventory_prices WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// All prices of an inventory, earliest window first.
pub async fn list_for_inventory(
    conn: &mut SqliteConnection,
    inventory_id: i64,
) -> DbResult<Vec<InventoryPrice>> {
    let sql = format!(
        "SELECT {} FROM inventory_prices WHERE inventory_id = ?1 ORDER BY valid_from, id",
        COLUMNS
    );
    let rows: Vec<PriceRow> = sqlx::query_as(&sql)
        .bind(inventory_id)
        .fetch_all(conn)
        .await?;

    rows.into_iter().map(InventoryPrice::try_from).collect()
}
