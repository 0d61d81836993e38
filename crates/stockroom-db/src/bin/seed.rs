//! # Seed Data Generator
//!
//! Populates a development database with a business, products, purchases,
//! sales and sale prices, then prints the resulting inventories as JSON.
//!
//! ## Usage
//! ```bash
//! # 20 products, 3 purchase batches each (default)
//! cargo run -p stockroom-db --bin seed
//!
//! # Custom amount
//! cargo run -p stockroom-db --bin seed -- --products 50 --batches 5
//!
//! # Specify database path
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom.db
//! ```
//!
//! Ledger policies come from the environment (`STOCKROOM_SALE_RESTORE_POLICY`,
//! `STOCKROOM_PURCHASE_CANCEL_FLOOR`). Log level follows `RUST_LOG`.

use std::env;
use std::time::Instant;

use chrono::{Duration, Utc};
use stockroom_core::{
    Money, NewInventoryPrice, NewPurchase, NewPurchaseLine, NewSale, NewSaleLine, PriceType,
    SaleStatus,
};
use stockroom_db::{Database, DbConfig, LedgerConfig};
use tracing_subscriber::EnvFilter;

/// Product names for realistic test data
const PRODUCTS: &[&str] = &[
    "Espresso Beans",
    "Oat Milk",
    "Whole Milk",
    "Cane Sugar",
    "Cocoa Powder",
    "Vanilla Syrup",
    "Caramel Syrup",
    "Paper Cups 12oz",
    "Paper Cups 16oz",
    "Lids",
    "Stir Sticks",
    "Napkins",
    "Croissants",
    "Bagels",
    "Cream Cheese",
    "Green Tea",
    "Black Tea",
    "Chai Concentrate",
    "Honey",
    "Almond Milk",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut product_count: usize = 20;
    let mut batches: i64 = 3;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    product_count = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--batches" | "-b" => {
                if i + 1 < args.len() {
                    batches = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N>  Number of products (default: 20)");
                println!("  -b, --batches <N>   Purchases per product (default: 3)");
                println!("  -d, --db <PATH>     Database path (default: STOCKROOM_DB_PATH)");
                println!("  -h, --help          Show this help");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    // Sales need stock: at least one product and one batch
    let product_count = product_count.max(1);
    let batches = batches.max(1);

    let mut config = DbConfig::from_env()?;
    if let Some(path) = db_path {
        config.database_path = path.into();
    }
    let ledger = LedgerConfig::from_env()?;

    println!("Stockroom Seed Data Generator");
    println!("=============================");
    println!("Database: {}", config.database_path.display());
    println!("Products: {} x {} batches", product_count, batches);
    println!(
        "Policies: restore={}, cancel floor={}",
        ledger.sale_restore_policy, ledger.purchase_cancel_floor
    );
    println!();

    let db = Database::new(config, ledger).await?;
    let start = Instant::now();

    let catalog = db.catalog();
    let business_id = catalog.create_business("Seed Coffee Co.").await?;
    let supplier_id = catalog.create_supplier(business_id, "Seed Wholesale").await?;
    let customer_id = catalog.create_customer(business_id, "Walk-in").await?;

    let mut product_ids = Vec::with_capacity(product_count);
    for (index, name) in PRODUCTS.iter().cycle().take(product_count).enumerate() {
        // Alternate between the shared catalog and business-private products
        let id = if index % 2 == 0 {
            catalog.create_global_product(name).await?
        } else {
            catalog.create_business_product(business_id, name).await?
        };
        product_ids.push((index % 2 == 0, id));
    }

    let mut purchases = 0;
    for batch in 0..batches {
        let entry_date = Utc::now() - Duration::days(batches - batch);
        let details = product_ids
            .iter()
            .enumerate()
            .map(|(index, (global, id))| NewPurchaseLine {
                global_product_id: global.then_some(*id),
                business_product_id: (!global).then_some(*id),
                quantity: 10 + ((index as i64 * 7 + batch) % 40),
                price: Money::from_cents(150 + (index as i64 * 37) % 900),
                lot_number: Some(format!("LOT-{:02}-{:03}", batch + 1, index)),
                entry_date: Some(entry_date),
                expiration_date: Some(entry_date + Duration::days(90)),
            })
            .collect();

        db.purchases()
            .create(&NewPurchase {
                business_id,
                supplier_id: Some(supplier_id),
                status: None,
                details,
            })
            .await?;
        purchases += 1;
    }

    let mut sales = 0;
    for (index, (global, id)) in product_ids.iter().enumerate() {
        let sale = NewSale {
            business_id,
            customer_id: Some(customer_id),
            status: Some(SaleStatus::Completed),
            details: vec![NewSaleLine {
                global_product_id: global.then_some(*id),
                business_product_id: (!global).then_some(*id),
                quantity: 5 + (index as i64 % 10),
                price: Money::from_cents(450 + (index as i64 * 53) % 1200),
            }],
        };
        let created = db.sales().create(&sale).await?;
        sales += 1;

        // Cancel every fifth sale to exercise the restore path
        if index % 5 == 4 {
            db.sales().cancel(created.sale.id).await?;
        }
    }

    // One open-ended sale price per inventory
    let mut prices = 0;
    for (index, stocked) in db.inventories().list_by_business(business_id).await?.iter().enumerate() {
        db.inventories()
            .create_price(&NewInventoryPrice {
                inventory_id: stocked.inventory.id,
                price_type: PriceType::Sale,
                price: Money::from_cents(500 + (index as i64 * 61) % 1500),
                valid_from: Utc::now(),
                valid_to: None,
            })
            .await?;
        prices += 1;
    }

    let elapsed = start.elapsed();
    println!(
        "✓ Recorded {} purchases, {} sales and {} prices in {:?}",
        purchases, sales, prices, elapsed
    );
    println!();

    let inventories = db.inventories().list_by_business(business_id).await?;
    println!("{}", serde_json::to_string_pretty(&inventories)?);

    db.close().await;
    Ok(())
}
