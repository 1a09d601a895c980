//! Read-only aggregates for the admin dashboard.

use serde::Serialize;
use std::collections::BTreeMap;
use crate::domain::aggregates::{OrderStatus, Product};
use crate::domain::value_objects::UserId;
use crate::store::catalog::{into_products, ProductRow, PRODUCT_COLUMNS};
use crate::store::DbPool;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub product_count: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub unsynced_orders: i64,
}

#[derive(Clone)]
pub struct Reports {
    pool: DbPool,
}

impl Reports {
    pub fn new(pool: DbPool) -> Self { Self { pool } }

    pub async fn summary(&self) -> Result<DashboardSummary> {
        let (product_count, total_orders, pending_orders, unsynced_orders): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM products), \
                    (SELECT COUNT(*) FROM orders), \
                    (SELECT COUNT(*) FROM orders WHERE status = 'pending'), \
                    (SELECT COUNT(*) FROM orders WHERE is_synced = 0)",
        )
        .fetch_one(&self.pool).await?;
        Ok(DashboardSummary { product_count, total_orders, pending_orders, unsynced_orders })
    }

    /// Every status is present in the result, zero when no order has it.
    pub async fn count_by_status(&self, user_id: Option<UserId>) -> Result<BTreeMap<OrderStatus, i64>> {
        let rows: Vec<(String, i64)> = match user_id {
            Some(user_id) => sqlx::query_as("SELECT status, COUNT(*) FROM orders WHERE user_id = ?1 GROUP BY status")
                .bind(user_id.to_string()).fetch_all(&self.pool).await?,
            None => sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(&self.pool).await?,
        };
        let mut counts: BTreeMap<OrderStatus, i64> = OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for (status, count) in rows {
            counts.insert(status.parse()?, count);
        }
        Ok(counts)
    }

    /// Products at or below `threshold` units, lowest stock first.
    pub async fn low_stock(&self, threshold: u32) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE stock_quantity <= ?1 ORDER BY stock_quantity, id");
        into_products(sqlx::query_as::<_, ProductRow>(&sql).bind(i64::from(threshold)).fetch_all(&self.pool).await?)
    }
}
