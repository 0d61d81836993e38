//! # Sale Repository
//!
//! Stock-out and its reversal.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                           │
//! │     ├── INSERT sales                ← takes the writer lock            │
//! │     └── per line:                                                      │
//! │         ├── INSERT sale_details                                        │
//! │         ├── no inventory?           → NoInventory                      │
//! │         ├── total -= qty guarded    → InsufficientStock                │
//! │         ├── FIFO walk over lots     → InsufficientLotStock             │
//! │         └── INSERT sale_lot_allocations                                │
//! │                                                                         │
//! │  2. CANCEL (one transaction)                                           │
//! │     ├── status → canceled           ← guard + writer lock              │
//! │     └── per detail:                                                    │
//! │         ├── inventory missing? skip                                    │
//! │         ├── total += qty                                               │
//! │         └── lots += qty             (SaleRestorePolicy)                │
//! │                                                                         │
//! │  Any error drops the transaction: nothing of the sale is kept.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use stockroom_core::ledger::{newest_lot, plan_draw, plan_restore, LotOrder, LotTake, SaleRestorePolicy};
use stockroom_core::query::SaleQuery;
use stockroom_core::timestamp::to_millis;
use stockroom_core::validation::{validate_new_sale, validate_page};
use stockroom_core::{
    CancelOutcome, CoreError, Money, NewSale, Page, Sale, SaleDetail, SaleLotAllocation, SaleOrder,
    SaleStatus, SaleWithDetails,
};
use tracing::{debug, info, warn};

use super::{catalog, decode_product, decode_ts, inventory, lot, now, push_page, HeaderFilter, SALE_HEADERS};
use crate::config::LedgerConfig;
use crate::error::{DbError, DbResult, LedgerResult};

const TABLE: &str = "sales";

const HEADER_COLUMNS: &str =
    "id, business_id, customer_id, total_amount_cents, status, created_at, updated_at";

/// `HEADER_COLUMNS` read through the joined listing query.
const LIST_COLUMNS: &str = "h.id AS id, h.business_id AS business_id, h.customer_id AS customer_id, \
    h.total_amount_cents AS total_amount_cents, h.status AS status, \
    h.created_at AS created_at, h.updated_at AS updated_at";

const DETAIL_COLUMNS: &str = "id, sale_id, business_product_id, global_product_id, \
                              quantity, price_cents, total_amount_cents";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    business_id: i64,
    customer_id: Option<i64>,
    total_amount_cents: i64,
    status: SaleStatus,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Self> {
        Ok(Sale {
            id: row.id,
            business_id: row.business_id,
            customer_id: row.customer_id,
            total_amount: Money::from_cents(row.total_amount_cents),
            status: row.status,
            created_at: decode_ts(TABLE, "created_at", row.created_at)?,
            updated_at: decode_ts(TABLE, "updated_at", row.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleDetailRow {
    id: i64,
    sale_id: i64,
    business_product_id: Option<i64>,
    global_product_id: Option<i64>,
    quantity: i64,
    price_cents: i64,
    total_amount_cents: i64,
}

impl TryFrom<SaleDetailRow> for SaleDetail {
    type Error = DbError;

    fn try_from(row: SaleDetailRow) -> DbResult<Self> {
        Ok(SaleDetail {
            id: row.id,
            sale_id: row.sale_id,
            product: decode_product("sale_details", row.business_product_id, row.global_product_id)?,
            quantity: row.quantity,
            price: Money::from_cents(row.price_cents),
            total_amount: Money::from_cents(row.total_amount_cents),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    lot_id: i64,
    quantity: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    ledger: LedgerConfig,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerConfig) -> Self {
        SaleRepository { pool, ledger }
    }

    /// Records a sale and takes its stock out.
    ///
    /// ## Errors
    /// - `NoInventory` when a line's product was never stocked
    /// - `InsufficientStock` when the aggregate cannot cover a line
    /// - `InsufficientLotStock` when the aggregate can but the lots cannot
    ///
    /// On any of these, no part of the sale is kept.
    pub async fn create(&self, input: &NewSale) -> LedgerResult<SaleWithDetails> {
        let order = validate_new_sale(input)?;
        self.check_references(&order).await?;

        let mut tx = self.pool.begin().await?;
        let created = record(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            sale_id = created.sale.id,
            business_id = created.sale.business_id,
            lines = created.details.len(),
            total = %created.sale.total_amount,
            "Sale recorded"
        );
        Ok(created)
    }

    /// Cancels a sale and puts its stock back.
    ///
    /// The sale is kept with status `canceled`. A second cancel fails with
    /// `InvalidStatus` and restores nothing.
    pub async fn cancel(&self, sale_id: i64) -> LedgerResult<CancelOutcome> {
        let mut tx = self.pool.begin().await?;
        reverse(&mut tx, sale_id, self.ledger.sale_restore_policy).await?;
        tx.commit().await?;

        info!(
            sale_id,
            policy = %self.ledger.sale_restore_policy,
            "Sale canceled and stock restored"
        );
        Ok(CancelOutcome::sale(sale_id))
    }

    /// Gets a sale with its details.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<SaleWithDetails>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!("SELECT {} FROM sales WHERE id = ?1", HEADER_COLUMNS);
        let row: Option<SaleRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sale = Sale::try_from(row)?;
        let details = fetch_details(&mut conn, &[sale.id]).await?;
        Ok(Some(SaleWithDetails { sale, details }))
    }

    /// Lists a business's sales, one page at a time.
    pub async fn list(&self, business_id: i64, query: &SaleQuery) -> LedgerResult<Page<SaleWithDetails>> {
        validate_page(query)?;

        let filter = HeaderFilter {
            status: query.filter.status.map(|s| s.as_str()),
            party_id: query.filter.customer_id,
            party_name: query.filter.customer_name.clone(),
            total_amount: query.filter.total_amount,
            created_from: query.filter.created_from,
            updated_from: query.filter.updated_from,
            ..HeaderFilter::new(SALE_HEADERS, business_id)
        };

        let mut conn = self.pool.acquire().await?;

        let mut count = SALE_HEADERS.select("COUNT(*)");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut select = SALE_HEADERS.select(LIST_COLUMNS);
        filter.push_where(&mut select);
        push_page(&mut select, query.order_by, query.direction, query.limit, query.offset());
        let rows: Vec<SaleRow> = select.build_query_as().fetch_all(&mut *conn).await?;

        let sales = rows
            .into_iter()
            .map(Sale::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        let ids: Vec<i64> = sales.iter().map(|s| s.id).collect();

        let mut by_sale: HashMap<i64, Vec<SaleDetail>> = HashMap::new();
        for detail in fetch_details(&mut conn, &ids).await? {
            by_sale.entry(detail.sale_id).or_default().push(detail);
        }

        let data = sales
            .into_iter()
            .map(|sale| {
                let details = by_sale.remove(&sale.id).unwrap_or_default();
                SaleWithDetails { sale, details }
            })
            .collect();

        debug!(business_id, total, page = query.page, "Listed sales");
        Ok(Page::new(data, total, query.page, query.limit))
    }

    /// Lot draws recorded for a sale, in the order they were made.
    pub async fn allocations(&self, sale_id: i64) -> DbResult<Vec<SaleLotAllocation>> {
        let rows: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT a.id, a.sale_detail_id, a.lot_id, a.quantity
            FROM sale_lot_allocations a
            JOIN sale_details d ON d.id = a.sale_detail_id
            WHERE d.sale_id = ?1
            ORDER BY a.id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, sale_detail_id, lot_id, quantity)| SaleLotAllocation {
                id,
                sale_detail_id,
                lot_id,
                quantity,
            })
            .collect())
    }

    async fn check_references(&self, order: &SaleOrder) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await?;
        if let Some(customer_id) = order.customer_id {
            catalog::ensure_customer(&mut conn, order.business_id, customer_id).await?;
        }
        for (line, sale_line) in order.lines.iter().enumerate() {
            catalog::ensure_product(&mut conn, order.business_id, sale_line.product, line).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Units of Work
// =============================================================================

/// Writes a validated sale and its stock movements on `conn`.
pub async fn record(conn: &mut SqliteConnection, order: &SaleOrder) -> LedgerResult<SaleWithDetails> {
    let at = now();

    let sale_id = sqlx::query(
        r#"
        INSERT INTO sales (
            business_id, customer_id, total_amount_cents, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(order.business_id)
    .bind(order.customer_id)
    .bind(order.total_amount.cents())
    .bind(order.status)
    .bind(to_millis(at))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    debug!(sale_id, business_id = order.business_id, "Inserted sale header");

    let mut details = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        let detail_id = sqlx::query(
            r#"
            INSERT INTO sale_details (
                sale_id, business_product_id, global_product_id,
                quantity, price_cents, total_amount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sale_id)
        .bind(line.product.business_product_id())
        .bind(line.product.global_product_id())
        .bind(line.quantity)
        .bind(line.price.cents())
        .bind(line.total_amount.cents())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        let inv = inventory::resolve(&mut *conn, order.business_id, line.product)
            .await?
            .ok_or(CoreError::NoInventory { product: line.product })?;

        if inv.stock_quantity_total < line.quantity {
            return Err(CoreError::InsufficientStock {
                product: line.product,
                available: inv.stock_quantity_total,
                requested: line.quantity,
            }
            .into());
        }

        if !inventory::decrement_guarded(&mut *conn, inv.id, line.quantity, at).await? {
            let available = inventory::stock_total(&mut *conn, inv.id).await?;
            return Err(CoreError::InsufficientStock {
                product: line.product,
                available,
                requested: line.quantity,
            }
            .into());
        }

        let lots = lot::slices(&mut *conn, inv.id).await?;
        let plan = plan_draw(&lots, LotOrder::SALE_CONSUMPTION, line.quantity);
        if !plan.is_complete() {
            return Err(CoreError::InsufficientLotStock {
                product: line.product,
                requested: line.quantity,
                shortfall: plan.shortfall,
            }
            .into());
        }
        lot::apply_draw(&mut *conn, &plan).await?;

        for take in &plan.takes {
            sqlx::query(
                "INSERT INTO sale_lot_allocations (sale_detail_id, lot_id, quantity) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(detail_id)
            .bind(take.lot_id)
            .bind(take.quantity)
            .execute(&mut *conn)
            .await?;
        }

        details.push(SaleDetail {
            id: detail_id,
            sale_id,
            product: line.product,
            quantity: line.quantity,
            price: line.price,
            total_amount: line.total_amount,
        });
    }

    Ok(SaleWithDetails {
        sale: Sale {
            id: sale_id,
            business_id: order.business_id,
            customer_id: order.customer_id,
            total_amount: order.total_amount,
            status: order.status,
            created_at: at,
            updated_at: at,
        },
        details,
    })
}

/// Restores a sale's stock and marks it canceled, on `conn`.
pub async fn reverse(
    conn: &mut SqliteConnection,
    sale_id: i64,
    policy: SaleRestorePolicy,
) -> LedgerResult<()> {
    let at = now();

    let flipped = sqlx::query(
        "UPDATE sales SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status <> ?1",
    )
    .bind(SaleStatus::Canceled)
    .bind(to_millis(at))
    .bind(sale_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if flipped == 0 {
        let status: Option<SaleStatus> = sqlx::query_scalar("SELECT status FROM sales WHERE id = ?1")
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match status {
            Some(status) => CoreError::InvalidStatus {
                entity: "Sale",
                id: sale_id,
                status: status.to_string(),
            },
            None => CoreError::SaleNotFound(sale_id),
        }
        .into());
    }

    let business_id: i64 = sqlx::query_scalar("SELECT business_id FROM sales WHERE id = ?1")
        .bind(sale_id)
        .fetch_one(&mut *conn)
        .await?;

    for detail in fetch_details(&mut *conn, &[sale_id]).await? {
        let Some(inv) = inventory::resolve(&mut *conn, business_id, detail.product).await? else {
            warn!(
                sale_id,
                product = %detail.product,
                "No inventory for canceled sale line, skipping"
            );
            continue;
        };

        inventory::increment(&mut *conn, inv.id, detail.quantity, at).await?;

        let drawn = detail_allocations(&mut *conn, detail.id, inv.id).await?;
        let lots = lot::slices(&mut *conn, inv.id).await?;
        let newest = newest_lot(&lots).map(|slice| slice.lot_id);

        let plan = plan_restore(policy, &drawn, newest, detail.quantity);
        lot::apply_restore(&mut *conn, &plan).await?;

        if plan.unplaced > 0 {
            warn!(
                sale_id,
                inventory_id = inv.id,
                unplaced = plan.unplaced,
                "Inventory has no lot to restore into"
            );
        }
    }

    Ok(())
}

/// Draws of one detail, limited to lots still belonging to `inventory_id`.
async fn detail_allocations(
    conn: &mut SqliteConnection,
    sale_detail_id: i64,
    inventory_id: i64,
) -> DbResult<Vec<LotTake>> {
    let rows: Vec<AllocationRow> = sqlx::query_as(
        r#"
        SELECT a.lot_id, a.quantity
        FROM sale_lot_allocations a
        JOIN lots l ON l.id = a.lot_id
        WHERE a.sale_detail_id = ?1 AND l.inventory_id = ?2
        ORDER BY a.id
        "#,
    )
    .bind(sale_detail_id)
    .bind(inventory_id)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| LotTake {
            lot_id: row.lot_id,
            quantity: row.quantity,
        })
        .collect())
}

async fn fetch_details(conn: &mut SqliteConnection, sale_ids: &[i64]) -> DbResult<Vec<SaleDetail>> {
    if sale_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM sale_details WHERE sale_id IN (",
        DETAIL_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in sale_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY sale_id, id");

    let rows: Vec<SaleDetailRow> = qb.build_query_as().fetch_all(conn).await?;
    rows.into_iter().map(SaleDetail::try_from).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
