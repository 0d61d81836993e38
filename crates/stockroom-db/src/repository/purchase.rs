//! # Purchase Repository
//!
//! Stock-in and its reversal.
//!
//! ## Purchase Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Purchase Lifecycle                                │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                           │
//! │     ├── INSERT purchases            ← takes the writer lock            │
//! │     └── per line:                                                      │
//! │         ├── INSERT purchase_details                                    │
//! │         ├── inventory found?  total += qty                             │
//! │         │   else              new inventory with total = qty           │
//! │         └── INSERT lots (qty, entry_date default now)                  │
//! │                                                                         │
//! │  2. CANCEL (one transaction)                                           │
//! │     ├── status → canceled           ← guard + writer lock              │
//! │     ├── per detail:                                                    │
//! │     │   ├── inventory missing? skip                                    │
//! │     │   ├── total -= qty            (may go negative, see floor)       │
//! │     │   └── LIFO walk, lots clipped at 0                               │
//! │     └── DELETE details + purchase   (Active → Deleted)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use stockroom_core::ledger::{plan_draw, LotOrder, PurchaseCancelFloor};
use stockroom_core::query::PurchaseQuery;
use stockroom_core::timestamp::to_millis;
use stockroom_core::validation::{validate_new_purchase, validate_page};
use stockroom_core::{
    CancelOutcome, CoreError, Money, NewPurchase, Page, Purchase, PurchaseDetail, PurchaseOrder,
    PurchaseStatus, PurchaseWithDetails,
};
use tracing::{debug, info, warn};

use super::lot::{self, NewLot};
use super::{catalog, decode_product, decode_ts, inventory, now, push_page, HeaderFilter, PURCHASE_HEADERS};
use crate::config::LedgerConfig;
use crate::error::{DbError, DbResult, LedgerResult};

const TABLE: &str = "purchases";

const HEADER_COLUMNS: &str =
    "id, business_id, supplier_id, total_amount_cents, status, created_at, updated_at";

/// `HEADER_COLUMNS` read through the joined listing query.
const LIST_COLUMNS: &str = "h.id AS id, h.business_id AS business_id, h.supplier_id AS supplier_id, \
    h.total_amount_cents AS total_amount_cents, h.status AS status, \
    h.created_at AS created_at, h.updated_at AS updated_at";

const DETAIL_COLUMNS: &str = "id, purchase_id, business_product_id, global_product_id, \
                              quantity, price_cents, total_amount_cents";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: i64,
    business_id: i64,
    supplier_id: Option<i64>,
    total_amount_cents: i64,
    status: PurchaseStatus,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DbError;

    fn try_from(row: PurchaseRow) -> DbResult<Self> {
        Ok(Purchase {
            id: row.id,
            business_id: row.business_id,
            supplier_id: row.supplier_id,
            total_amount: Money::from_cents(row.total_amount_cents),
            status: row.status,
            created_at: decode_ts(TABLE, "created_at", row.created_at)?,
            updated_at: decode_ts(TABLE, "updated_at", row.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseDetailRow {
    id: i64,
    purchase_id: i64,
    business_product_id: Option<i64>,
    global_product_id: Option<i64>,
    quantity: i64,
    price_cents: i64,
    total_amount_cents: i64,
}

impl TryFrom<PurchaseDetailRow> for PurchaseDetail {
    type Error = DbError;

    fn try_from(row: PurchaseDetailRow) -> DbResult<Self> {
        Ok(PurchaseDetail {
            id: row.id,
            purchase_id: row.purchase_id,
            product: decode_product("purchase_details", row.business_product_id, row.global_product_id)?,
            quantity: row.quantity,
            price: Money::from_cents(row.price_cents),
            total_amount: Money::from_cents(row.total_amount_cents),
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for purchases.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
    ledger: LedgerConfig,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerConfig) -> Self {
        PurchaseRepository { pool, ledger }
    }

    /// Records a purchase and puts its stock in.
    ///
    /// Input is validated before the transaction opens. Everything after
    /// that commits together or not at all.
    pub async fn create(&self, input: &NewPurchase) -> LedgerResult<PurchaseWithDetails> {
        let order = validate_new_purchase(input)?;
        self.check_references(&order).await?;

        let mut tx = self.pool.begin().await?;
        let created = record(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            purchase_id = created.purchase.id,
            business_id = created.purchase.business_id,
            lines = created.details.len(),
            total = %created.purchase.total_amount,
            "Purchase recorded"
        );
        Ok(created)
    }

    /// Cancels a purchase: takes its stock back out and deletes it.
    ///
    /// ## Errors
    /// - `PurchaseNotFound` when the id is unknown, including a purchase
    ///   that was already canceled (it no longer exists)
    /// - `InsufficientStock` under `PurchaseCancelFloor::Reject` when the
    ///   stock has already been sold
    pub async fn cancel(&self, purchase_id: i64) -> LedgerResult<CancelOutcome> {
        let mut tx = self.pool.begin().await?;
        reverse(&mut tx, purchase_id, self.ledger.purchase_cancel_floor).await?;
        tx.commit().await?;

        info!(purchase_id, "Purchase canceled and stock reverted");
        Ok(CancelOutcome::purchase(purchase_id))
    }

    /// Gets a purchase with its details.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PurchaseWithDetails>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!("SELECT {} FROM purchases WHERE id = ?1", HEADER_COLUMNS);
        let row: Option<PurchaseRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let purchase = Purchase::try_from(row)?;
        let details = fetch_details(&mut conn, &[purchase.id]).await?;
        Ok(Some(PurchaseWithDetails { purchase, details }))
    }

    /// Lists a business's purchases, one page at a time.
    pub async fn list(
        &self,
        business_id: i64,
        query: &PurchaseQuery,
    ) -> LedgerResult<Page<PurchaseWithDetails>> {
        validate_page(query)?;

        let filter = HeaderFilter {
            status: query.filter.status.map(|s| s.as_str()),
            party_id: query.filter.supplier_id,
            party_name: query.filter.supplier_name.clone(),
            total_amount: query.filter.total_amount,
            created_from: query.filter.created_from,
            updated_from: query.filter.updated_from,
            ..HeaderFilter::new(PURCHASE_HEADERS, business_id)
        };

        let mut conn = self.pool.acquire().await?;

        let mut count = PURCHASE_HEADERS.select("COUNT(*)");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut select = PURCHASE_HEADERS.select(LIST_COLUMNS);
        filter.push_where(&mut select);
        push_page(&mut select, query.order_by, query.direction, query.limit, query.offset());
        let rows: Vec<PurchaseRow> = select.build_query_as().fetch_all(&mut *conn).await?;

        let purchases = rows
            .into_iter()
            .map(Purchase::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        let ids: Vec<i64> = purchases.iter().map(|p| p.id).collect();

        let mut by_purchase: HashMap<i64, Vec<PurchaseDetail>> = HashMap::new();
        for detail in fetch_details(&mut conn, &ids).await? {
            by_purchase.entry(detail.purchase_id).or_default().push(detail);
        }

        let data = purchases
            .into_iter()
            .map(|purchase| {
                let details = by_purchase.remove(&purchase.id).unwrap_or_default();
                PurchaseWithDetails { purchase, details }
            })
            .collect();

        debug!(business_id, total, page = query.page, "Listed purchases");
        Ok(Page::new(data, total, query.page, query.limit))
    }

    async fn check_references(&self, order: &PurchaseOrder) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await?;
        if let Some(supplier_id) = order.supplier_id {
            catalog::ensure_supplier(&mut conn, order.business_id, supplier_id).await?;
        }
        for (line, purchase_line) in order.lines.iter().enumerate() {
            catalog::ensure_product(&mut conn, order.business_id, purchase_line.product, line)
                .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Units of Work
// =============================================================================

/// Writes a validated purchase and its stock movements on `conn`.
pub async fn record(
    conn: &mut SqliteConnection,
    order: &PurchaseOrder,
) -> LedgerResult<PurchaseWithDetails> {
    let at = now();

    let purchase_id = sqlx::query(
        r#"
        INSERT INTO purchases (
            business_id, supplier_id, total_amount_cents, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(order.business_id)
    .bind(order.supplier_id)
    .bind(order.total_amount.cents())
    .bind(order.status)
    .bind(to_millis(at))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    debug!(purchase_id, business_id = order.business_id, "Inserted purchase header");

    let mut details = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        let detail_id = sqlx::query(
            r#"
            INSERT INTO purchase_details (
                purchase_id, business_product_id, global_product_id,
                quantity, price_cents, total_amount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(purchase_id)
        .bind(line.product.business_product_id())
        .bind(line.product.global_product_id())
        .bind(line.quantity)
        .bind(line.price.cents())
        .bind(line.total_amount.cents())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        let inventory_id =
            match inventory::resolve(&mut *conn, order.business_id, line.product).await? {
                Some(existing) => {
                    inventory::increment(&mut *conn, existing.id, line.quantity, at).await?;
                    existing.id
                }
                None => {
                    inventory::create(&mut *conn, order.business_id, line.product, line.quantity, at)
                        .await?
                        .id
                }
            };

        lot::create(
            &mut *conn,
            NewLot {
                inventory_id,
                lot_number: line.lot_number.as_deref(),
                entry_date: line.entry_date.unwrap_or(at),
                expiration_date: line.expiration_date,
                quantity: line.quantity,
            },
            at,
        )
        .await?;

        details.push(PurchaseDetail {
            id: detail_id,
            purchase_id,
            product: line.product,
            quantity: line.quantity,
            price: line.price,
            total_amount: line.total_amount,
        });
    }

    Ok(PurchaseWithDetails {
        purchase: Purchase {
            id: purchase_id,
            business_id: order.business_id,
            supplier_id: order.supplier_id,
            total_amount: order.total_amount,
            status: order.status,
            created_at: at,
            updated_at: at,
        },
        details,
    })
}

/// Reverses a purchase's stock and deletes it, on `conn`.
pub async fn reverse(
    conn: &mut SqliteConnection,
    purchase_id: i64,
    floor: PurchaseCancelFloor,
) -> LedgerResult<()> {
    let at = now();

    // Status flip first: it is the state-machine guard and takes the writer lock
    let flipped = sqlx::query(
        "UPDATE purchases SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status <> ?1",
    )
    .bind(PurchaseStatus::Canceled)
    .bind(to_millis(at))
    .bind(purchase_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if flipped == 0 {
        let status: Option<PurchaseStatus> =
            sqlx::query_scalar("SELECT status FROM purchases WHERE id = ?1")
                .bind(purchase_id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match status {
            Some(status) => CoreError::InvalidStatus {
                entity: "Purchase",
                id: purchase_id,
                status: status.to_string(),
            },
            None => CoreError::PurchaseNotFound(purchase_id),
        }
        .into());
    }

    let business_id: i64 = sqlx::query_scalar("SELECT business_id FROM purchases WHERE id = ?1")
        .bind(purchase_id)
        .fetch_one(&mut *conn)
        .await?;

    for detail in fetch_details(&mut *conn, &[purchase_id]).await? {
        let Some(inv) = inventory::resolve(&mut *conn, business_id, detail.product).await? else {
            warn!(
                purchase_id,
                product = %detail.product,
                "No inventory for canceled purchase line, skipping"
            );
            continue;
        };

        if !floor.permits(inv.stock_quantity_total, detail.quantity) {
            return Err(CoreError::InsufficientStock {
                product: detail.product,
                available: inv.stock_quantity_total,
                requested: detail.quantity,
            }
            .into());
        }

        let total = inventory::decrement(&mut *conn, inv.id, detail.quantity, at).await?;
        if total < 0 {
            warn!(
                purchase_id,
                inventory_id = inv.id,
                product = %detail.product,
                total,
                "Inventory negative after purchase cancel"
            );
        }

        let lots = lot::slices(&mut *conn, inv.id).await?;
        let plan = plan_draw(&lots, LotOrder::PURCHASE_CANCEL, detail.quantity);
        lot::apply_draw(&mut *conn, &plan).await?;

        if plan.shortfall > 0 {
            warn!(
                purchase_id,
                inventory_id = inv.id,
                shortfall = plan.shortfall,
                "Lots could not absorb the whole purchase cancel"
            );
        }
    }

    sqlx::query("DELETE FROM purchase_details WHERE purchase_id = ?1")
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM purchases WHERE id = ?1")
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;

    debug!(purchase_id, "Deleted purchase");
    Ok(())
}

async fn fetch_details(conn: &mut SqliteConnection, purchase_ids: &[i64]) -> DbResult<Vec<PurchaseDetail>> {
    if purchase_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM purchase_details WHERE purchase_id IN (",
        DETAIL_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in purchase_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY purchase_id, id");

    let rows: Vec<PurchaseDetailRow> = qb.build_query_as().fetch_all(conn).await?;
    rows.into_iter().map(PurchaseDetail::try_from).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, LedgerError};
    use stockroom_core::query::PurchaseFilter;
    use stockroom_core::{NewPurchaseLine, ProductRef, ValidationError};

    struct Fixture {
        db: Database,
        business: i64,
        supplier: i64,
        product: i64,
    }

    async fn setup(ledger: LedgerConfig) -> Fixture {
        let db = Database::new(DbConfig::in_memory(), ledger).await.unwrap();
        let business = db.catalog().create_business("Corner Shop").await.unwrap();
        let supplier = db.catalog().create_supplier(business, "Acme Wholesale").await.unwrap();
        let product = db.catalog().create_global_product("Espresso Beans").await.unwrap();
        Fixture {
            db,
            business,
            supplier,
            product,
        }
    }

    fn purchase(business: i64, product: i64, quantity: i64, price: i64) -> NewPurchase {
        NewPurchase {
            business_id: business,
            details: vec![NewPurchaseLine {
                global_product_id: Some(product),
                quantity,
                price: Money::from_cents(price),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = setup(LedgerConfig::default()).await;
        let mut input = purchase(f.business, f.product, 20, 500);
        input.supplier_id = Some(f.supplier);

        let created = f.db.purchases().create(&input).await.unwrap();
        assert_eq!(created.purchase.total_amount.cents(), 10_000);
        assert_eq!(created.purchase.status, PurchaseStatus::Pending);
        assert_eq!(created.details[0].total_amount.cents(), 10_000);

        let fetched = f.db.purchases().get_by_id(created.purchase.id).await.unwrap();
        assert_eq!(fetched, Some(created));

        let inventory = f
            .db
            .inventories()
            .find(f.business, ProductRef::Global(f.product))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inventory.stock_quantity_total, 20);
    }

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let f = setup(LedgerConfig::default()).await;
        let mut input = purchase(f.business, f.product, 20, 500);
        input.details[0].business_product_id = Some(1);

        let err = f.db.purchases().create(&input).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::AmbiguousProduct { line: 0 }))
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_foreign_supplier_is_rejected() {
        let f = setup(LedgerConfig::default()).await;
        let other = f.db.catalog().create_business("Other Shop").await.unwrap();
        let other_supplier = f.db.catalog().create_supplier(other, "Elsewhere").await.unwrap();

        let mut input = purchase(f.business, f.product, 1, 100);
        input.supplier_id = Some(other_supplier);

        let err = f.db.purchases().create(&input).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::ForeignRecord { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancel_twice_reports_not_found() {
        let f = setup(LedgerConfig::default()).await;
        let created = f
            .db
            .purchases()
            .create(&purchase(f.business, f.product, 5, 100))
            .await
            .unwrap();

        let outcome = f.db.purchases().cancel(created.purchase.id).await.unwrap();
        assert_eq!(outcome.id, created.purchase.id);
        assert!(f.db.purchases().get_by_id(created.purchase.id).await.unwrap().is_none());

        let err = f.db.purchases().cancel(created.purchase.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PurchaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_reject_floor_keeps_everything() {
        let ledger = LedgerConfig::default().purchase_cancel_floor(PurchaseCancelFloor::Reject);
        let f = setup(ledger).await;
        let created = f
            .db
            .purchases()
            .create(&purchase(f.business, f.product, 20, 100))
            .await
            .unwrap();

        // Sell part of it directly on the aggregate
        sqlx::query("UPDATE inventories SET stock_quantity_total = 5")
            .execute(f.db.pool())
            .await
            .unwrap();

        let err = f.db.purchases().cancel(created.purchase.id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock {
                available: 5,
                requested: 20,
                ..
            })
        ));

        // Rolled back: purchase still there with its original status
        let fetched = f.db.purchases().get_by_id(created.purchase.id).await.unwrap().unwrap();
        assert_eq!(fetched.purchase.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let f = setup(LedgerConfig::default()).await;
        for quantity in 1..=12 {
            let mut input = purchase(f.business, f.product, quantity, 100);
            if quantity % 3 == 0 {
                input.status = Some(PurchaseStatus::Received);
                input.supplier_id = Some(f.supplier);
            }
            f.db.purchases().create(&input).await.unwrap();
        }

        let page = f
            .db
            .purchases()
            .list(f.business, &PurchaseQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.last_page, 2);
        assert_eq!(page.data.len(), 10);
        // Newest first by default
        assert_eq!(page.data[0].details[0].quantity, 12);

        let received = f
            .db
            .purchases()
            .list(
                f.business,
                &PurchaseQuery::default()
                    .filter(PurchaseFilter {
                        status: Some(PurchaseStatus::Received),
                        supplier_id: Some(f.supplier),
                        ..Default::default()
                    })
                    .order(
                        stockroom_core::OrderBy::TotalAmount,
                        stockroom_core::Direction::Asc,
                    ),
            )
            .await
            .unwrap();
        assert_eq!(received.total, 4);
        let totals: Vec<i64> = received
            .data
            .iter()
            .map(|p| p.purchase.total_amount.cents())
            .collect();
        assert_eq!(totals, vec![300, 600, 900, 1200]);

        let by_amount = f
            .db
            .purchases()
            .list(
                f.business,
                &PurchaseQuery::default().filter(PurchaseFilter {
                    total_amount: Some(Money::from_cents(700)),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        assert_eq!(by_amount.total, 1);

        let other_business = f.db.catalog().create_business("Other").await.unwrap();
        let empty = f
            .db
            .purchases()
            .list(other_business, &PurchaseQuery::default())
            .await
            .unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.last_page, 0);
    }

    #[tokio::test]
    async fn test_list_by_supplier_name() {
        let f = setup(LedgerConfig::default()).await;
        let bakery = f.db.catalog().create_supplier(f.business, "Bakery Direct").await.unwrap();
        let odd = f.db.catalog().create_supplier(f.business, "100%_Beans").await.unwrap();

        for (supplier, quantity) in [(Some(f.supplier), 1), (Some(bakery), 2), (None, 3), (Some(odd), 4)] {
            let mut input = purchase(f.business, f.product, quantity, 100);
            input.supplier_id = supplier;
            f.db.purchases().create(&input).await.unwrap();
        }

        let by_name = |name: &str| {
            PurchaseQuery::default().filter(PurchaseFilter {
                supplier_name: Some(name.to_string()),
                ..Default::default()
            })
        };

        // Case-insensitive substring
        let acme = f.db.purchases().list(f.business, &by_name("WHOLE")).await.unwrap();
        assert_eq!(acme.total, 1);
        assert_eq!(acme.data[0].purchase.supplier_id, Some(f.supplier));

        // Wildcards in the term match literally
        let literal = f.db.purchases().list(f.business, &by_name("%_")).await.unwrap();
        assert_eq!(literal.total, 1);
        assert_eq!(literal.data[0].purchase.supplier_id, Some(odd));

        let none = f.db.purchases().list(f.business, &by_name("nobody")).await.unwrap();
        assert_eq!(none.total, 0);

        // Ordered by supplier name; the purchase without a supplier sorts first
        let ordered = f
            .db
            .purchases()
            .list(
                f.business,
                &PurchaseQuery::default().order(
                    stockroom_core::OrderBy::PartyName,
                    stockroom_core::Direction::Asc,
                ),
            )
            .await
            .unwrap();
        let suppliers: Vec<Option<i64>> = ordered.data.iter().map(|p| p.purchase.supplier_id).collect();
        assert_eq!(suppliers, vec![None, Some(odd), Some(f.supplier), Some(bakery)]);
    }
}
