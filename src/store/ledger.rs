//! Order ledger.
//!
//! Every stored order corresponds to exactly one stock deduction, and every
//! order in `cancelled` to exactly one restoration. Placement and cancellation
//! run their check-and-write sequence inside one SQLite transaction while
//! holding the row locks for the order and product involved, so concurrent
//! callers cannot overdraw stock or restore it twice.
//!
//! The first statement of every ledger transaction is a write. SQLite then
//! takes the write lock when the transaction starts and waits out
//! `busy_timeout` behind other writers, instead of failing when a read
//! snapshot taken earlier in the transaction has gone stale.
//!
//! `is_synced` is cleared on creation and on every status change. It is set
//! only through [`OrderLedger::mark_synced`] / [`OrderLedger::mark_synced_if`]
//! after the remote service acknowledged the order.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use validator::Validate;
use crate::domain::aggregates::{Order, OrderStatus, PlaceOrder, Transition};
use crate::domain::value_objects::{OrderId, ProductId, UserId};
use crate::store::{CatalogStore, DbPool, RowKey, RowLocks};
use crate::{LedgerError, Result};

const ORDER_COLUMNS: &str = "id, user_id, product_id, product_name, quantity, unit_price, total_price, \
                             delivery_method, status, order_date, delivery_address, is_synced";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    user_id: String,
    product_id: i64,
    product_name: String,
    quantity: i64,
    unit_price: String,
    total_price: String,
    delivery_method: String,
    status: String,
    order_date: DateTime<Utc>,
    delivery_address: Option<String>,
    is_synced: bool,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;

    fn try_from(row: OrderRow) -> Result<Self> {
        let corrupt = |what: &str| LedgerError::CorruptRecord(format!("order {}: bad {what}", row.id));
        Ok(Order {
            id: OrderId::new(row.id),
            user_id: row.user_id.parse::<UserId>().map_err(|_| corrupt("user_id"))?,
            product_id: ProductId::new(row.product_id),
            quantity: u32::try_from(row.quantity).map_err(|_| corrupt("quantity"))?,
            unit_price: row.unit_price.parse().map_err(|_| corrupt("unit_price"))?,
            total_price: row.total_price.parse().map_err(|_| corrupt("total_price"))?,
            delivery_method: row.delivery_method.parse()?,
            status: row.status.parse()?,
            product_name: row.product_name,
            order_date: row.order_date,
            delivery_address: row.delivery_address,
            synced: row.is_synced,
        })
    }
}

/// Optional filters for [`OrderLedger::list_orders`]; both may be combined.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_user(user_id: UserId) -> Self { Self { user_id: Some(user_id), status: None } }
    pub fn with_status(mut self, status: OrderStatus) -> Self { self.status = Some(status); self }
}

#[derive(Clone)]
pub struct OrderLedger {
    pool: DbPool,
    locks: Arc<RowLocks>,
}

impl OrderLedger {
    pub fn new(pool: DbPool, locks: Arc<RowLocks>) -> Self {
        Self { pool, locks }
    }

    /// Creates a pending order and deducts its quantity from stock, all or nothing.
    #[tracing::instrument(skip(self, req), fields(product_id = %req.product_id, quantity = req.quantity))]
    pub async fn place_order(&self, req: PlaceOrder) -> Result<Order> {
        req.validate()?;
        let _product = self.locks.lock(RowKey::Product(req.product_id)).await;
        let mut tx = self.pool.begin().await?;

        let remaining = CatalogStore::adjust_stock_in(&mut tx, req.product_id, -i64::from(req.quantity)).await?;
        let product = CatalogStore::find_product_in(&mut tx, req.product_id).await?
            .ok_or(LedgerError::ProductNotFound(req.product_id))?;

        // Placeholder id until the insert assigns one.
        let mut order = Order::place(OrderId::new(0), &req, &product, Utc::now())?;
        let inserted = sqlx::query(
            "INSERT INTO orders (user_id, product_id, product_name, quantity, unit_price, total_price, \
             delivery_method, status, order_date, delivery_address, is_synced) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
        )
        .bind(order.user_id().to_string()).bind(order.product_id()).bind(order.product_name())
        .bind(i64::from(order.quantity())).bind(order.unit_price().to_string()).bind(order.total_price().to_string())
        .bind(order.delivery_method().as_str()).bind(order.status().as_str()).bind(order.order_date())
        .bind(order.delivery_address())
        .execute(&mut *tx).await?;
        order.id = OrderId::new(inserted.last_insert_rowid());
        tx.commit().await?;

        tracing::info!(order_id = %order.id(), remaining, "Order placed");
        Ok(order)
    }

    /// Moves an order along the status state machine. Entering `cancelled`
    /// restores stock once; re-applying the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, next: OrderStatus) -> Result<Transition> {
        let _order = self.locks.lock(RowKey::Order(order_id)).await;
        let current = self.get_order(order_id).await?;
        let transition = current.plan_transition(next)?;
        let Transition::Changed { from, to, restock } = transition else {
            tracing::debug!(status = %next, "Status unchanged");
            return Ok(transition);
        };

        let _product = if restock {
            Some(self.locks.lock(RowKey::Product(current.product_id())).await)
        } else {
            None
        };
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE orders SET status = ?1, is_synced = 0 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str()).bind(order_id).bind(from.as_str())
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            return Err(LedgerError::OrderNotFound(order_id));
        }

        if restock {
            match CatalogStore::adjust_stock_in(&mut tx, current.product_id(), i64::from(current.quantity())).await {
                Ok(stock) => tracing::debug!(product_id = %current.product_id(), stock, "Stock restored"),
                Err(LedgerError::ProductNotFound(product_id)) => {
                    tracing::warn!(%product_id, "Product no longer exists, cancelling without restock");
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;
        tracing::info!(%from, %to, "Order status updated");
        Ok(transition)
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Transition> {
        self.update_status(order_id, OrderStatus::Cancelled).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
        sqlx::query_as::<_, OrderRow>(&sql).bind(order_id).fetch_optional(&self.pool).await?
            .ok_or(LedgerError::OrderNotFound(order_id))?
            .try_into()
    }

    /// Newest first.
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1"));
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.to_string());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY order_date DESC, id DESC");
        let rows = query.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Orders whose current state the remote service has not acknowledged, oldest first.
    pub async fn list_unsynced(&self) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE is_synced = 0 ORDER BY id");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Call only after the remote service confirmed the order's current state.
    pub async fn mark_synced(&self, order_id: OrderId) -> Result<()> {
        let _order = self.locks.lock(RowKey::Order(order_id)).await;
        let result = sqlx::query("UPDATE orders SET is_synced = 1 WHERE id = ?1")
            .bind(order_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::OrderNotFound(order_id));
        }
        Ok(())
    }

    /// Marks the order synced only if it is still in `acknowledged`, the status
    /// the remote service confirmed. Returns `false` when the order has moved on
    /// since, leaving it unsynced for the next cycle.
    pub async fn mark_synced_if(&self, order_id: OrderId, acknowledged: OrderStatus) -> Result<bool> {
        let _order = self.locks.lock(RowKey::Order(order_id)).await;
        let result = sqlx::query("UPDATE orders SET is_synced = 1 WHERE id = ?1 AND status = ?2")
            .bind(order_id).bind(acknowledged.as_str()).execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = ?1")
            .bind(order_id).fetch_optional(&self.pool).await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(LedgerError::OrderNotFound(order_id)),
        }
    }
}
