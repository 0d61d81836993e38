//! End-to-end ledger behavior against a real SQLite database.
//!
//! Each test builds its own database; nothing is shared between tests.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use stockroom_core::{
    CoreError, Lot, Money, NewPurchase, NewPurchaseLine, NewSale, NewSaleLine, ProductRef,
    PurchaseCancelFloor, SaleRestorePolicy,
};
use stockroom_db::{ApiError, Database, DbConfig, ErrorCode, LedgerConfig, LedgerError};

// =============================================================================
// Helpers
// =============================================================================

struct Shop {
    db: Database,
    business: i64,
}

impl Shop {
    async fn open(ledger: LedgerConfig) -> Shop {
        let db = Database::new(DbConfig::in_memory(), ledger).await.unwrap();
        let business = db.catalog().create_business("Corner Shop").await.unwrap();
        Shop { db, business }
    }

    async fn product(&self, name: &str) -> i64 {
        self.db.catalog().create_global_product(name).await.unwrap()
    }

    async fn buy(&self, product: i64, quantity: i64, entry_date: DateTime<Utc>) -> i64 {
        self.db
            .purchases()
            .create(&NewPurchase {
                business_id: self.business,
                details: vec![purchase_line(product, quantity, entry_date)],
                ..Default::default()
            })
            .await
            .unwrap()
            .purchase
            .id
    }

    async fn sell(&self, lines: &[(i64, i64)]) -> Result<i64, LedgerError> {
        let details = lines
            .iter()
            .map(|&(product, quantity)| NewSaleLine {
                global_product_id: Some(product),
                quantity,
                price: Money::from_cents(999),
                ..Default::default()
            })
            .collect();

        self.db
            .sales()
            .create(&NewSale {
                business_id: self.business,
                details,
                ..Default::default()
            })
            .await
            .map(|sale| sale.sale.id)
    }

    async fn total(&self, product: i64) -> i64 {
        self.stock(ProductRef::Global(product)).await.unwrap_or_default()
    }

    /// `None` when the product has no inventory.
    async fn stock(&self, product: ProductRef) -> Option<i64> {
        self.db
            .inventories()
            .find(self.business, product)
            .await
            .unwrap()
            .map(|inv| inv.stock_quantity_total)
    }

    /// Lots of one product, oldest first.
    async fn lots(&self, product: i64) -> Vec<Lot> {
        let Some(inv) = self
            .db
            .inventories()
            .find(self.business, ProductRef::Global(product))
            .await
            .unwrap()
        else {
            return Vec::new();
        };
        self.db
            .inventories()
            .get_by_id(inv.id)
            .await
            .unwrap()
            .map(|with_lots| with_lots.lots)
            .unwrap_or_default()
    }

    async fn lot_quantities(&self, product: i64) -> Vec<i64> {
        self.lots(product).await.iter().map(|lot| lot.stock_quantity).collect()
    }
}

fn purchase_line(product: i64, quantity: i64, entry_date: DateTime<Utc>) -> NewPurchaseLine {
    NewPurchaseLine {
        global_product_id: Some(product),
        quantity,
        price: Money::from_cents(500),
        entry_date: Some(entry_date),
        ..Default::default()
    }
}

fn line_for(product: ProductRef, quantity: i64) -> NewPurchaseLine {
    NewPurchaseLine {
        business_product_id: product.business_product_id(),
        global_product_id: product.global_product_id(),
        quantity,
        price: Money::from_cents(500),
        entry_date: Some(day(0)),
        ..Default::default()
    }
}

fn sale_line_for(product: ProductRef, quantity: i64) -> NewSaleLine {
    NewSaleLine {
        business_product_id: product.business_product_id(),
        global_product_id: product.global_product_id(),
        quantity,
        price: Money::from_cents(999),
    }
}

fn day(n: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::days(n)
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn purchase_then_sale_of_same_quantity_conserves_stock() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Oat Milk").await;

    shop.buy(product, 12, day(0)).await;
    let before = shop.total(product).await;

    shop.buy(product, 30, day(1)).await;
    shop.sell(&[(product, 30)]).await.unwrap();

    assert_eq!(shop.total(product).await, before);
}

#[tokio::test]
async fn stock_never_goes_negative_through_purchases_and_sales() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Oat Milk").await;

    // Deterministic mix of purchases and sales, some of which oversell
    let mut seed: i64 = 7;
    for step in 0..60 {
        seed = (seed * 31 + 11) % 97;
        if step % 3 == 0 {
            shop.buy(product, 1 + seed % 9, day(step)).await;
        } else {
            let _ = shop.sell(&[(product, 1 + seed % 12)]).await;
        }

        let min_total: Option<i64> =
            sqlx::query_scalar("SELECT MIN(stock_quantity_total) FROM inventories")
                .fetch_one(shop.db.pool())
                .await
                .unwrap();
        let min_lot: Option<i64> = sqlx::query_scalar("SELECT MIN(stock_quantity) FROM lots")
            .fetch_one(shop.db.pool())
            .await
            .unwrap();
        assert!(min_total.unwrap_or_default() >= 0, "step {step}");
        assert!(min_lot.unwrap_or_default() >= 0, "step {step}");
    }

    let lot_sum: i64 = shop.lot_quantities(product).await.iter().sum();
    assert_eq!(lot_sum, shop.total(product).await);
}

#[tokio::test]
async fn failed_line_rolls_back_earlier_lines() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let beans = shop.product("Espresso Beans").await;
    let cups = shop.product("Paper Cups").await;
    shop.buy(beans, 10, day(0)).await;
    shop.buy(cups, 2, day(0)).await;

    let err = shop.sell(&[(beans, 5), (cups, 3)]).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Core(CoreError::InsufficientStock {
            available: 2,
            requested: 3,
            ..
        })
    ));

    assert_eq!(shop.total(beans).await, 10);
    assert_eq!(shop.lot_quantities(beans).await, vec![10]);
    assert_eq!(shop.total(cups).await, 2);

    let details: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_details")
        .fetch_one(shop.db.pool())
        .await
        .unwrap();
    let allocations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_lot_allocations")
        .fetch_one(shop.db.pool())
        .await
        .unwrap();
    assert_eq!((details, allocations), (0, 0));
}

#[tokio::test]
async fn sale_consumes_oldest_lot_first() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Oat Milk").await;

    // Newer lot recorded first so insertion order cannot explain the result
    shop.buy(product, 5, day(2)).await;
    shop.buy(product, 5, day(1)).await;

    shop.sell(&[(product, 7)]).await.unwrap();

    let lots = shop.lots(product).await;
    assert_eq!(lots[0].entry_date, day(1));
    assert_eq!(lots[0].stock_quantity, 0);
    assert_eq!(lots[1].entry_date, day(2));
    assert_eq!(lots[1].stock_quantity, 3);
}

#[tokio::test]
async fn purchase_cancel_drains_newest_lot_first() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Oat Milk").await;

    shop.buy(product, 5, day(1)).await;
    let second = shop.buy(product, 5, day(2)).await;

    shop.db.purchases().cancel(second).await.unwrap();

    assert_eq!(shop.total(product).await, 5);
    assert_eq!(shop.lot_quantities(product).await, vec![5, 0]);
}

#[tokio::test]
async fn purchase_cancel_walks_all_lots_of_the_inventory() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Oat Milk").await;

    let first = shop.buy(product, 5, day(1)).await;
    shop.buy(product, 5, day(2)).await;

    // Canceling the older purchase still takes from the newest lot
    shop.db.purchases().cancel(first).await.unwrap();

    assert_eq!(shop.total(product).await, 5);
    assert_eq!(shop.lot_quantities(product).await, vec![5, 0]);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn purchase_creates_inventory_and_lot() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;

    let created = shop
        .db
        .purchases()
        .create(&NewPurchase {
            business_id: shop.business,
            details: vec![NewPurchaseLine {
                global_product_id: Some(product),
                quantity: 20,
                price: Money::from_major_minor(5, 0),
                ..Default::default()
            }],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(created.purchase.total_amount.to_string(), "100.00");
    assert_eq!(shop.total(product).await, 20);
    assert_eq!(shop.lot_quantities(product).await, vec![20]);
}

#[tokio::test]
async fn oversell_is_rejected_and_stock_untouched() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;
    shop.buy(product, 20, day(0)).await;

    let err = shop.sell(&[(product, 25)]).await.unwrap_err();

    let api = ApiError::from(err);
    assert_eq!(api.code, ErrorCode::InsufficientStock);
    assert_eq!(api.code.http_status(), 422);
    assert_eq!(shop.total(product).await, 20);
}

#[tokio::test]
async fn sale_decrements_inventory_and_lot() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;
    shop.buy(product, 20, day(0)).await;

    shop.sell(&[(product, 15)]).await.unwrap();

    assert_eq!(shop.total(product).await, 5);
    assert_eq!(shop.lot_quantities(product).await, vec![5]);
}

#[tokio::test]
async fn purchase_cancel_after_sale_goes_negative_by_default() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;
    let purchase = shop.buy(product, 20, day(0)).await;
    shop.sell(&[(product, 15)]).await.unwrap();

    shop.db.purchases().cancel(purchase).await.unwrap();

    assert_eq!(shop.total(product).await, -15);
    // Lots clip at zero
    assert_eq!(shop.lot_quantities(product).await, vec![0]);
    assert!(shop.db.purchases().get_by_id(purchase).await.unwrap().is_none());
}

#[tokio::test]
async fn purchase_cancel_after_sale_is_refused_under_reject_floor() {
    let ledger = LedgerConfig::default().purchase_cancel_floor(PurchaseCancelFloor::Reject);
    let shop = Shop::open(ledger).await;
    let product = shop.product("Espresso Beans").await;
    let purchase = shop.buy(product, 20, day(0)).await;
    shop.sell(&[(product, 15)]).await.unwrap();

    let err = shop.db.purchases().cancel(purchase).await.unwrap_err();
    assert!(matches!(err, LedgerError::Core(CoreError::InsufficientStock { .. })));

    assert_eq!(shop.total(product).await, 5);
    assert_eq!(shop.lot_quantities(product).await, vec![5]);
    assert!(shop.db.purchases().get_by_id(purchase).await.unwrap().is_some());
}

#[tokio::test]
async fn sale_cancel_restores_everything_into_newest_lot() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;
    shop.buy(product, 10, day(1)).await;
    shop.buy(product, 10, day(2)).await;

    let sale = shop.sell(&[(product, 15)]).await.unwrap();
    assert_eq!(shop.lot_quantities(product).await, vec![0, 5]);

    shop.db.sales().cancel(sale).await.unwrap();

    assert_eq!(shop.total(product).await, 20);
    assert_eq!(shop.lot_quantities(product).await, vec![0, 20]);
}

#[tokio::test]
async fn sale_cancel_can_restore_into_consumed_lots() {
    let ledger = LedgerConfig::default().sale_restore_policy(SaleRestorePolicy::ConsumedLots);
    let shop = Shop::open(ledger).await;
    let product = shop.product("Espresso Beans").await;
    shop.buy(product, 10, day(1)).await;
    shop.buy(product, 10, day(2)).await;

    let sale = shop.sell(&[(product, 15)]).await.unwrap();
    shop.db.sales().cancel(sale).await.unwrap();

    assert_eq!(shop.total(product).await, 20);
    assert_eq!(shop.lot_quantities(product).await, vec![10, 10]);
}

// =============================================================================
// Cancellation Edges
// =============================================================================

#[tokio::test]
async fn second_sale_cancel_changes_nothing() {
    let shop = Shop::open(LedgerConfig::default()).await;
    let product = shop.product("Espresso Beans").await;
    shop.buy(product, 20, day(0)).await;
    let sale = shop.sell(&[(product, 15)]).await.unwrap();

    shop.db.sales().cancel(sale).await.unwrap();
    let err = shop.db.sales().cancel(sale).await.unwrap_err();

    assert_eq!(ApiError::from(err).code, ErrorCode::InvalidStatus);
    assert_eq!(shop.total(product).await, 20);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let shop = Shop::open(LedgerConfig::default()).await;

    let err = shop.db.purchases().cancel(404).await.unwrap_err();
    assert_eq!(ApiError::from(err).code, ErrorCode::NotFound);

    let err = shop.db.sales().cancel(404).await.unwrap_err();
    assert_eq!(ApiError::from(err).code, ErrorCode::NotFound);
}

/// A business product and a global product that share numeric id 1, both
/// purchased in one order.
async fn shop_with_twin_products() -> (Shop, ProductRef, ProductRef, i64) {
    let shop = Shop::open(LedgerConfig::default()).await;
    let local = shop
        .db
        .catalog()
        .create_business_product(shop.business, "House Blend")
        .await
        .unwrap();
    let global = shop.product("House Blend").await;
    assert_eq!(local, global);

    let (local, global) = (ProductRef::Business(local), ProductRef::Global(global));
    let purchase = shop
        .db
        .purchases()
        .create(&NewPurchase {
            business_id: shop.business,
            details: vec![line_for(local, 4), line_for(global, 9)],
            ..Default::default()
        })
        .await
        .unwrap()
        .purchase
        .id;

    (shop, local, global, purchase)
}

#[tokio::test]
async fn business_and_global_products_with_the_same_id_stay_apart() {
    let (shop, local, global, _) = shop_with_twin_products().await;

    shop.db
        .sales()
        .create(&NewSale {
            business_id: shop.business,
            details: vec![sale_line_for(local, 3)],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(shop.stock(local).await, Some(1));
    assert_eq!(shop.stock(global).await, Some(9));
    assert_eq!(shop.db.inventories().list_by_business(shop.business).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancels_skip_lines_whose_inventory_is_gone() {
    let (shop, local, global, purchase) = shop_with_twin_products().await;

    let sale = shop
        .db
        .sales()
        .create(&NewSale {
            business_id: shop.business,
            details: vec![sale_line_for(local, 3), sale_line_for(global, 2)],
            ..Default::default()
        })
        .await
        .unwrap()
        .sale
        .id;
    assert_eq!(shop.stock(local).await, Some(1));
    assert_eq!(shop.stock(global).await, Some(7));

    // Remove the global inventory along with its lots and their allocations
    let inventory = shop.db.inventories().find(shop.business, global).await.unwrap().unwrap();
    for sql in [
        "DELETE FROM sale_lot_allocations WHERE lot_id IN (SELECT id FROM lots WHERE inventory_id = ?1)",
        "DELETE FROM lots WHERE inventory_id = ?1",
        "DELETE FROM inventories WHERE id = ?1",
    ] {
        sqlx::query(sql).bind(inventory.id).execute(shop.db.pool()).await.unwrap();
    }

    // The sale still restores its other line and does not recreate the inventory
    shop.db.sales().cancel(sale).await.unwrap();
    assert_eq!(shop.stock(local).await, Some(4));
    assert_eq!(shop.stock(global).await, None);

    shop.db.purchases().cancel(purchase).await.unwrap();
    assert_eq!(shop.stock(local).await, Some(0));
    assert_eq!(shop.stock(global).await, None);
    assert!(shop.db.purchases().get_by_id(purchase).await.unwrap().is_none());
}

// =============================================================================
// Concurrency
// =============================================================================

struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_cannot_oversell() {
    let scratch = ScratchFile(
        std::env::temp_dir().join(format!("stockroom-{}.db", uuid::Uuid::new_v4())),
    );
    let db = Database::new(DbConfig::new(&scratch.0).max_connections(4), LedgerConfig::default())
        .await
        .unwrap();
    let business = db.catalog().create_business("Corner Shop").await.unwrap();
    let product = db.catalog().create_global_product("Espresso Beans").await.unwrap();
    db.purchases()
        .create(&NewPurchase {
            business_id: business,
            details: vec![purchase_line(product, 10, day(0))],
            ..Default::default()
        })
        .await
        .unwrap();

    let sale = NewSale {
        business_id: business,
        details: vec![NewSaleLine {
            global_product_id: Some(product),
            quantity: 7,
            price: Money::from_cents(999),
            ..Default::default()
        }],
        ..Default::default()
    };

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let sales = db.sales();
            let sale = sale.clone();
            tokio::spawn(async move { sales.create(&sale).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(
                matches!(err, LedgerError::Core(CoreError::InsufficientStock { .. })),
                "unexpected error: {err}"
            ),
        }
    }
    assert_eq!(succeeded, 1);

    let inventory = db
        .inventories()
        .find(business, ProductRef::Global(product))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inventory.stock_quantity_total, 3);

    db.close().await;
}
