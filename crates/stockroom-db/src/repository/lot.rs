//! # Lot Steps
//!
//! Transaction steps on the `lots` table. Which lots to touch is decided by
//! `stockroom_core::ledger`; this module only reads and applies.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockroom_core::ledger::{DrawPlan, LotSlice, LotTake, RestorePlan};
use stockroom_core::timestamp::to_millis;
use stockroom_core::Lot;
use tracing::debug;

use super::{decode_ts, decode_ts_opt};
use crate::error::{DbError, DbResult};

const TABLE: &str = "lots";

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: i64,
    inventory_id: i64,
    lot_number: Option<String>,
    entry_date: i64,
    expiration_date: Option<i64>,
    stock_quantity: i64,
    created_at: i64,
}

impl TryFrom<LotRow> for Lot {
    type Error = DbError;

    fn try_from(row: LotRow) -> DbResult<Self> {
        Ok(Lot {
            id: row.id,
            inventory_id: row.inventory_id,
            lot_number: row.lot_number,
            entry_date: decode_ts(TABLE, "entry_date", row.entry_date)?,
            expiration_date: decode_ts_opt(TABLE, "expiration_date", row.expiration_date)?,
            stock_quantity: row.stock_quantity,
            created_at: decode_ts(TABLE, "created_at", row.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SliceRow {
    id: i64,
    entry_date: i64,
    stock_quantity: i64,
}

/// Attributes of a new lot.
#[derive(Debug, Clone)]
pub struct NewLot<'a> {
    pub inventory_id: i64,
    pub lot_number: Option<&'a str>,
    pub entry_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub quantity: i64,
}

/// Inserts a lot and returns its id.
pub async fn create(conn: &mut SqliteConnection, lot: NewLot<'_>, at: DateTime<Utc>) -> DbResult<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO lots (
            inventory_id, lot_number, entry_date, expiration_date, stock_quantity, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(lot.inventory_id)
    .bind(lot.lot_number)
    .bind(to_millis(lot.entry_date))
    .bind(lot.expiration_date.map(to_millis))
    .bind(lot.quantity)
    .bind(to_millis(at))
    .execute(conn)
    .await?
    .last_insert_rowid();

    debug!(lot_id = id, inventory_id = lot.inventory_id, quantity = lot.quantity, "Created lot");
    Ok(id)
}

/// All lots of an inventory, empty ones included, as planner input.
pub async fn slices(conn: &mut SqliteConnection, inventory_id: i64) -> DbResult<Vec<LotSlice>> {
    let rows: Vec<SliceRow> = sqlx::query_as(
        "SELECT id, entry_date, stock_quantity FROM lots WHERE inventory_id = ?1 \
         ORDER BY entry_date, id",
    )
    .bind(inventory_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| -> DbResult<LotSlice> {
            Ok(LotSlice {
                lot_id: row.id,
                entry_date: decode_ts(TABLE, "entry_date", row.entry_date)?,
                stock_quantity: row.stock_quantity,
            })
        })
        .collect()
}

/// All lots of an inventory, oldest first.
pub async fn list_for_inventory(conn: &mut SqliteConnection, inventory_id: i64) -> DbResult<Vec<Lot>> {
    let rows: Vec<LotRow> = sqlx::query_as(
        r#"
        SELECT id, inventory_id, lot_number, entry_date, expiration_date, stock_quantity, created_at
        FROM lots
        WHERE inventory_id = ?1
        ORDER BY entry_date, id
        "#,
    )
    .bind(inventory_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(Lot::try_from).collect()
}

/// Applies a draw plan. Each take is guarded so a lot never goes below zero.
pub async fn apply_draw(conn: &mut SqliteConnection, plan: &DrawPlan) -> DbResult<()> {
    for take in &plan.takes {
        take_from(&mut *conn, *take).await?;
    }
    Ok(())
}

async fn take_from(conn: &mut SqliteConnection, take: LotTake) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE lots SET stock_quantity = stock_quantity - ?1 \
         WHERE id = ?2 AND stock_quantity >= ?1",
    )
    .bind(take.quantity)
    .bind(take.lot_id)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::CheckViolation {
            message: format!("lot {} cannot give {}", take.lot_id, take.quantity),
        });
    }

    debug!(lot_id = take.lot_id, quantity = take.quantity, "Took from lot");
    Ok(())
}

/// Applies a restore plan.
pub async fn apply_restore(conn: &mut SqliteConnection, plan: &RestorePlan) -> DbResult<()> {
    for put in &plan.puts {
        sqlx::query("UPDATE lots SET stock_quantity = stock_quantity + ?1 WHERE id = ?2")
            .bind(put.quantity)
            .bind(put.lot_id)
            .execute(&mut *conn)
            .await?;

        debug!(lot_id = put.lot_id, quantity = put.quantity, "Restored to lot");
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{inventory, now};
    use crate::{Database, DbConfig, LedgerConfig};
    use stockroom_core::ledger::{plan_draw, LotOrder};
    use stockroom_core::ProductRef;

    #[tokio::test]
    async fn test_draw_is_applied_in_plan_order() {
        let db = Database::new(DbConfig::in_memory(), LedgerConfig::default())
            .await
            .unwrap();
        let business = db.catalog().create_business("Corner Shop").await.unwrap();
        let product = db.catalog().create_global_product("Oat Milk").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let inv = inventory::create(&mut conn, business, ProductRef::Global(product), 30, now())
            .await
            .unwrap();

        let day = |d: i64| DateTime::from_timestamp(d * 86_400, 0).unwrap();
        let older = create(
            &mut conn,
            NewLot {
                inventory_id: inv.id,
                lot_number: Some("A"),
                entry_date: day(1),
                expiration_date: Some(day(30)),
                quantity: 20,
            },
            now(),
        )
        .await
        .unwrap();
        let newer = create(
            &mut conn,
            NewLot {
                inventory_id: inv.id,
                lot_number: None,
                entry_date: day(2),
                expiration_date: None,
                quantity: 10,
            },
            now(),
        )
        .await
        .unwrap();

        let lots = slices(&mut conn, inv.id).await.unwrap();
        let plan = plan_draw(&lots, LotOrder::Fifo, 25);
        apply_draw(&mut conn, &plan).await.unwrap();

        let lots = list_for_inventory(&mut conn, inv.id).await.unwrap();
        assert_eq!(lots[0].id, older);
        assert_eq!(lots[0].stock_quantity, 0);
        assert_eq!(lots[0].lot_number.as_deref(), Some("A"));
        assert_eq!(lots[0].expiration_date, Some(day(30)));
        assert_eq!(lots[1].id, newer);
        assert_eq!(lots[1].stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_overdraw_is_refused() {
        let db = Database::new(DbConfig::in_memory(), LedgerConfig::default())
            .await
            .unwrap();
        let business = db.catalog().create_business("Corner Shop").await.unwrap();
        let product = db.catalog().create_global_product("Oat Milk").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let inv = inventory::create(&mut conn, business, ProductRef::Global(product), 3, now())
            .await
            .unwrap();
        let lot_id = create(
            &mut conn,
            NewLot {
                inventory_id: inv.id,
                lot_number: None,
                entry_date: now(),
                expiration_date: None,
                quantity: 3,
            },
            now(),
        )
        .await
        .unwrap();

        let plan = DrawPlan {
            takes: vec![LotTake { lot_id, quantity: 4 }],
            shortfall: 0,
        };
        assert!(apply_draw(&mut conn, &plan).await.is_err());
    }
}
