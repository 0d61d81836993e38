//! # Catalog Repository
//!
//! Minimal businesses, products, suppliers and customers.
//!
//! These records are managed by collaborators; the ledger only needs them
//! for foreign keys and ownership checks. Creation is here so a database can
//! be bootstrapped (seed binary, tests).

use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::timestamp::to_millis;
use stockroom_core::{ProductRef, ValidationError};
use tracing::debug;

use super::now;
use crate::error::DbResult;
use crate::LedgerResult;

/// Repository for the catalog tables.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Creates a business and returns its id.
    pub async fn create_business(&self, name: &str) -> DbResult<i64> {
        let id = sqlx::query("INSERT INTO businesses (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(to_millis(now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        debug!(business_id = id, name, "Created business");
        Ok(id)
    }

    /// Creates a product in the shared global catalog.
    pub async fn create_global_product(&self, name: &str) -> DbResult<i64> {
        let id = sqlx::query("INSERT INTO global_products (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(to_millis(now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        debug!(global_product_id = id, name, "Created global product");
        Ok(id)
    }

    /// Creates a product private to `business_id`.
    pub async fn create_business_product(&self, business_id: i64, name: &str) -> DbResult<i64> {
        self.insert_owned("business_products", business_id, name).await
    }

    pub async fn create_supplier(&self, business_id: i64, name: &str) -> DbResult<i64> {
        self.insert_owned("suppliers", business_id, name).await
    }

    pub async fn create_customer(&self, business_id: i64, name: &str) -> DbResult<i64> {
        self.insert_owned("customers", business_id, name).await
    }

    async fn insert_owned(&self, table: &'static str, business_id: i64, name: &str) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (business_id, name, created_at) VALUES (?1, ?2, ?3)",
            table
        );
        let id = sqlx::query(&sql)
            .bind(business_id)
            .bind(name)
            .bind(to_millis(now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        debug!(table, id, business_id, name, "Created catalog record");
        Ok(id)
    }
}

// =============================================================================
// Ownership Checks
// =============================================================================

async fn owner_of(conn: &mut SqliteConnection, table: &'static str, id: i64) -> DbResult<Option<i64>> {
    let sql = format!("SELECT business_id FROM {} WHERE id = ?1", table);
    let owner = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(owner)
}

async fn ensure_owned(
    conn: &mut SqliteConnection,
    table: &'static str,
    field: String,
    id: i64,
    business_id: i64,
) -> LedgerResult<()> {
    match owner_of(conn, table, id).await? {
        Some(owner) if owner == business_id => Ok(()),
        _ => Err(ValidationError::ForeignRecord {
            field,
            id,
            business_id,
        }
        .into()),
    }
}

/// Rejects a supplier that is unknown or belongs to another business.
pub async fn ensure_supplier(
    conn: &mut SqliteConnection,
    business_id: i64,
    supplier_id: i64,
) -> LedgerResult<()> {
    ensure_owned(conn, "suppliers", "supplier_id".to_string(), supplier_id, business_id).await
}

/// Rejects a customer that is unknown or belongs to another business.
pub async fn ensure_customer(
    conn: &mut SqliteConnection,
    business_id: i64,
    customer_id: i64,
) -> LedgerResult<()> {
    ensure_owned(conn, "customers", "customer_id".to_string(), customer_id, business_id).await
}

/// Rejects a business product that belongs to another business.
///
/// Global products are shared and left to the foreign key.
pub async fn ensure_product(
    conn: &mut SqliteConnection,
    business_id: i64,
    product: ProductRef,
    line: usize,
) -> LedgerResult<()> {
    match product {
        ProductRef::Business(id) => {
            ensure_owned(
                conn,
                "business_products",
                format!("details[{}].business_product_id", line),
                id,
                business_id,
            )
            .await
        }
        ProductRef::Global(_) => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, LedgerConfig, LedgerError};
    use stockroom_core::CoreError;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory(), LedgerConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_business_product_ownership() {
        let db = setup().await;
        let catalog = db.catalog();
        let shop = catalog.create_business("Corner Shop").await.unwrap();
        let other = catalog.create_business("Other Shop").await.unwrap();
        let product = catalog.create_business_product(shop, "House Blend").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(ensure_product(&mut conn, shop, ProductRef::Business(product), 0)
            .await
            .is_ok());

        let err = ensure_product(&mut conn, other, ProductRef::Business(product), 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::ForeignRecord { .. }))
        ));
        assert!(err.to_string().contains("details[2].business_product_id"));
    }

    #[tokio::test]
    async fn test_unknown_supplier_is_rejected() {
        let db = setup().await;
        let shop = db.catalog().create_business("Corner Shop").await.unwrap();
        let supplier = db.catalog().create_supplier(shop, "Acme").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(ensure_supplier(&mut conn, shop, supplier).await.is_ok());
        assert!(ensure_supplier(&mut conn, shop, supplier + 100).await.is_err());
    }

    #[tokio::test]
    async fn test_business_product_requires_existing_business() {
        let db = setup().await;
        let err = db.catalog().create_business_product(999, "Orphan").await.unwrap_err();
        assert!(matches!(err, crate::DbError::ForeignKeyViolation { .. }));
    }
}
