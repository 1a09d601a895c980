//! Catalog store: products and their stock levels.
//!
//! Has no locking of its own. Stock arithmetic is only race-free when it goes
//! through [`OrderLedger`](super::OrderLedger), which serializes callers per row.

use rust_decimal::prelude::ToPrimitive;
use sqlx::{FromRow, SqliteConnection};
use validator::Validate;
use crate::domain::aggregates::{Product, ProductDraft};
use crate::domain::value_objects::{Price, ProductId};
use crate::store::DbPool;
use crate::{LedgerError, Result};

pub(crate) const PRODUCT_COLUMNS: &str = "id, name, category, price, stock_quantity, image, description, is_available";

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    category: String,
    price: String,
    stock_quantity: i64,
    image: Option<String>,
    description: Option<String>,
    is_available: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = LedgerError;

    fn try_from(row: ProductRow) -> Result<Self> {
        let price: Price = row.price.parse()
            .map_err(|e| LedgerError::CorruptRecord(format!("product {}: {e}", row.id)))?;
        let stock_quantity = u32::try_from(row.stock_quantity)
            .map_err(|_| LedgerError::CorruptRecord(format!("product {}: stock {}", row.id, row.stock_quantity)))?;
        Ok(Product {
            id: ProductId::new(row.id), name: row.name, category: row.category, price, stock_quantity,
            is_available: row.is_available, description: row.description, image: row.image,
        })
    }
}

pub(crate) fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: DbPool,
}

impl CatalogStore {
    pub fn new(pool: DbPool) -> Self { Self { pool } }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        let mut conn = self.pool.acquire().await?;
        Self::find_product_in(&mut conn, id).await?.ok_or(LedgerError::ProductNotFound(id))
    }

    pub(crate) async fn find_product_in(conn: &mut SqliteConnection, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        sqlx::query_as::<_, ProductRow>(&sql).bind(id).fetch_optional(&mut *conn).await?
            .map(Product::try_from).transpose()
    }

    /// Applies `delta` to the product's stock in its own transaction and
    /// returns the new stock level.
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        let mut tx = self.pool.begin().await?;
        let stock = Self::adjust_stock_in(&mut tx, id, delta).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Stock adjustment on a caller-owned connection, usually an open
    /// transaction. The row is left untouched if the result would go negative.
    pub(crate) async fn adjust_stock_in(conn: &mut SqliteConnection, id: ProductId, delta: i64) -> Result<u32> {
        // SET expressions see the pre-update row, so both columns use the old stock.
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE products SET stock_quantity = stock_quantity + ?1, is_available = (stock_quantity + ?1) > 0 \
             WHERE id = ?2 AND stock_quantity + ?1 >= 0 RETURNING stock_quantity",
        )
        .bind(delta).bind(id)
        .fetch_optional(&mut *conn).await?;

        if let Some(stock) = updated {
            return u32::try_from(stock).map_err(|_| LedgerError::CorruptRecord(format!("product {id}: stock {stock}")));
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
            .bind(id).fetch_optional(&mut *conn).await?;
        match available {
            None => Err(LedgerError::ProductNotFound(id)),
            Some(available) => Err(LedgerError::InsufficientStock {
                product_id: id,
                requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                available: u32::try_from(available).unwrap_or(0),
            }),
        }
    }

    /// Inserts when `id` is `None`, otherwise replaces the existing row.
    pub async fn upsert_product(&self, id: Option<ProductId>, draft: &ProductDraft) -> Result<Product> {
        draft.validate()?;
        let id = match id {
            None => {
                let result = sqlx::query(
                    "INSERT INTO products (name, category, price, stock_quantity, image, description, is_available) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(&draft.name).bind(&draft.category).bind(draft.price.to_string()).bind(i64::from(draft.stock_quantity))
                .bind(&draft.image).bind(&draft.description).bind(draft.stock_quantity > 0)
                .execute(&self.pool).await?;
                ProductId::new(result.last_insert_rowid())
            }
            Some(id) => {
                let result = sqlx::query(
                    "UPDATE products SET name = ?2, category = ?3, price = ?4, stock_quantity = ?5, image = ?6, \
                     description = ?7, is_available = ?8 WHERE id = ?1",
                )
                .bind(id).bind(&draft.name).bind(&draft.category).bind(draft.price.to_string()).bind(i64::from(draft.stock_quantity))
                .bind(&draft.image).bind(&draft.description).bind(draft.stock_quantity > 0)
                .execute(&self.pool).await?;
                if result.rows_affected() == 0 { return Err(LedgerError::ProductNotFound(id)); }
                id
            }
        };
        tracing::debug!(product_id = %id, "Product saved");
        Ok(Product::from_parts(id, draft.clone()))
    }

    /// Orders referencing the product keep its id; cancelling them later skips the restock.
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(LedgerError::ProductNotFound(id)); }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id");
        into_products(sqlx::query_as::<_, ProductRow>(&sql).fetch_all(&self.pool).await?)
    }

    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name LIKE ?1 ORDER BY name, id");
        let pattern = format!("%{}%", query.trim());
        into_products(sqlx::query_as::<_, ProductRow>(&sql).bind(pattern).fetch_all(&self.pool).await?)
    }

    pub async fn products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE category = ?1 ORDER BY name, id");
        into_products(sqlx::query_as::<_, ProductRow>(&sql).bind(category).fetch_all(&self.pool).await?)
    }

    /// Inclusive on both ends. SQLite narrows by `REAL` value with a little
    /// slack, then the decimal prices decide.
    pub async fn products_by_price_range(&self, min: Price, max: Price) -> Result<Vec<Product>> {
        let slack = |p: Price| p.amount().to_f64().unwrap_or(f64::MAX).abs() * 1e-9 + 1e-9;
        let low = min.amount().to_f64().unwrap_or(0.0) - slack(min);
        let high = max.amount().to_f64().unwrap_or(f64::MAX) + slack(max);
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE CAST(price AS REAL) BETWEEN ?1 AND ?2 ORDER BY name, id");
        let candidates = into_products(sqlx::query_as::<_, ProductRow>(&sql).bind(low).bind(high).fetch_all(&self.pool).await?)?;
        Ok(candidates.into_iter().filter(|p| p.price() >= min && p.price() <= max).collect())
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category").fetch_all(&self.pool).await?)
    }

    /// Seeds an empty catalog. Returns how many products were inserted.
    pub async fn seed_if_empty(&self, drafts: &[ProductDraft]) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(&self.pool).await?;
        if count > 0 { return Ok(0); }
        for draft in drafts {
            self.upsert_product(None, draft).await?;
        }
        tracing::info!(count = drafts.len(), "Catalog seeded");
        Ok(drafts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use crate::store::testing::{draft, test_pool};

    #[tokio::test]
    async fn test_upsert_and_get() {
        let catalog = CatalogStore::new(test_pool().await);
        let created = catalog.upsert_product(None, &draft("Milk", "Dairy", 199, 4)).await.unwrap();
        let fetched = catalog.get_product(created.id()).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.price().to_string(), "1.99");

        let updated = catalog.upsert_product(Some(created.id()), &draft("Whole Milk", "Dairy", 249, 0)).await.unwrap();
        assert_eq!(catalog.get_product(created.id()).await.unwrap(), updated);
        assert!(!updated.is_available());
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let catalog = CatalogStore::new(test_pool().await);
        let a = catalog.upsert_product(None, &draft("A", "X", 100, 1)).await.unwrap();
        let b = catalog.upsert_product(None, &draft("B", "X", 100, 1)).await.unwrap();
        assert!(b.id() > a.id());
    }

    #[tokio::test]
    async fn test_adjust_stock_bounds() {
        let catalog = CatalogStore::new(test_pool().await);
        let p = catalog.upsert_product(None, &draft("Eggs", "Dairy", 350, 3)).await.unwrap();
        assert_eq!(catalog.adjust_stock(p.id(), -3).await.unwrap(), 0);
        assert!(!catalog.get_product(p.id()).await.unwrap().is_available());

        let err = catalog.adjust_stock(p.id(), -1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { requested: 1, available: 0, .. }));

        assert_eq!(catalog.adjust_stock(p.id(), 2).await.unwrap(), 2);
        assert!(catalog.get_product(p.id()).await.unwrap().is_available());

        let missing = catalog.adjust_stock(ProductId::new(999), 1).await.unwrap_err();
        assert!(matches!(missing, LedgerError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let catalog = CatalogStore::new(test_pool().await);
        let p = catalog.upsert_product(None, &draft("Tea", "Drinks", 400, 2)).await.unwrap();
        catalog.delete_product(p.id()).await.unwrap();
        assert!(matches!(catalog.get_product(p.id()).await, Err(LedgerError::ProductNotFound(_))));
        assert!(matches!(catalog.delete_product(p.id()).await, Err(LedgerError::ProductNotFound(_))));
        assert!(matches!(catalog.upsert_product(Some(p.id()), &draft("Tea", "Drinks", 400, 2)).await, Err(LedgerError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_browse_queries() {
        let catalog = CatalogStore::new(test_pool().await);
        catalog.upsert_product(None, &draft("Green Apple", "Fruit", 120, 10)).await.unwrap();
        catalog.upsert_product(None, &draft("Banana", "Fruit", 60, 10)).await.unwrap();
        catalog.upsert_product(None, &draft("Cheddar", "Dairy", 550, 2)).await.unwrap();

        let names = |ps: Vec<Product>| ps.into_iter().map(|p| p.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(catalog.list_products().await.unwrap()), ["Banana", "Cheddar", "Green Apple"]);
        assert_eq!(names(catalog.search_products("apple").await.unwrap()), ["Green Apple"]);
        assert_eq!(names(catalog.products_by_category("Fruit").await.unwrap()), ["Banana", "Green Apple"]);
        let cheap = catalog.products_by_price_range(Price::zero(), Price::new(Decimal::new(120, 2)).unwrap()).await.unwrap();
        assert_eq!(names(cheap), ["Banana", "Green Apple"]);
        let edge = Price::new(Decimal::new(1_200_000_000_000_000_001, 18)).unwrap();
        let above_edge = catalog.products_by_price_range(edge, Price::MAX).await.unwrap();
        assert_eq!(names(above_edge), ["Cheddar"]);
        assert_eq!(catalog.categories().await.unwrap(), ["Dairy", "Fruit"]);
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let catalog = CatalogStore::new(test_pool().await);
        let seed = vec![draft("Rice", "Grains", 300, 5), draft("Oats", "Grains", 250, 5)];
        assert_eq!(catalog.seed_if_empty(&seed).await.unwrap(), 2);
        assert_eq!(catalog.seed_if_empty(&seed).await.unwrap(), 0);
        assert_eq!(catalog.list_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_invalid_draft() {
        let catalog = CatalogStore::new(test_pool().await);
        let err = catalog.upsert_product(None, &draft("", "X", 100, 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
