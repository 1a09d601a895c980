//! # Store
//!
//! SQLite-backed catalog and order ledger sharing one connection pool.

pub mod catalog;
pub mod ledger;
pub mod locks;
pub mod reports;

pub use catalog::CatalogStore;
pub use ledger::{OrderFilter, OrderLedger};
pub use locks::{RowKey, RowLocks};
pub use reports::{DashboardSummary, Reports};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use crate::Result;

pub type DbPool = SqlitePool;

/// Opens the database and applies pending migrations.
///
/// An in-memory database lives only as long as its connection, so it gets
/// exactly one that is never recycled.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(8)
    };
    let pool = pool_options.connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(database_url, "Database ready");
    Ok(pool)
}

/// The stores wired over a single pool and a single lock table.
#[derive(Clone)]
pub struct Stores {
    pub catalog: CatalogStore,
    pub ledger: OrderLedger,
    pub reports: Reports,
}

impl Stores {
    pub fn new(pool: DbPool) -> Self {
        let catalog = CatalogStore::new(pool.clone());
        let ledger = OrderLedger::new(pool.clone(), Arc::new(RowLocks::new()));
        Self { catalog, ledger, reports: Reports::new(pool) }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use rust_decimal::Decimal;
    use crate::domain::aggregates::ProductDraft;
    use crate::domain::value_objects::Price;
    use super::DbPool;

    pub async fn test_pool() -> DbPool {
        super::connect("sqlite::memory:").await.expect("in-memory database")
    }

    pub fn draft(name: &str, category: &str, cents: i64, stock: u32) -> ProductDraft {
        ProductDraft { name: name.into(), category: category.into(), price: Price::new(Decimal::new(cents, 2)).unwrap(), stock_quantity: stock, description: None, image: None }
    }
}
