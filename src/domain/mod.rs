//! Domain model: catalog products, ledger orders and their value objects.
pub mod aggregates;
pub mod value_objects;
