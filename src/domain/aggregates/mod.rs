//! Aggregates module
pub mod product;
pub mod order;

pub use product::{Product, ProductDraft};
pub use order::{DeliveryMethod, Order, OrderStatus, PlaceOrder, Transition};
