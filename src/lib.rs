//! Storefront Order Ledger
//!
//! Local-first order bookkeeping for a retail storefront.
//!
//! ## Features
//! - Product catalog with stock levels
//! - Atomic order placement and cancellation against stock
//! - Per-order sync flag tracking what the remote order service has acknowledged
//! - Background reconciliation with bounded retry
//! - Admin reporting (status counts, low stock)

pub mod api;
pub mod config;
pub mod domain;
pub mod store;
pub mod sync;

pub use domain::aggregates::{DeliveryMethod, Order, OrderStatus, PlaceOrder, Product, ProductDraft, Transition};
pub use domain::value_objects::{OrderId, Price, ProductId, UserId};
pub use store::{CatalogStore, OrderFilter, OrderLedger, Reports};
pub use sync::{SyncReconciler, SyncReport};

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: u32, available: u32 },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatus, to: OrderStatus },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self { Self::Validation(errors.to_string()) }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
