//! Product Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use crate::domain::value_objects::{Price, ProductId};

/// Highest accepted unit price. Any order quantity times this still fits a `Decimal`.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// A catalog entry as stored. Stock is only moved through the ledger.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Product {
    pub(crate) id: ProductId,
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) price: Price,
    pub(crate) stock_quantity: u32,
    pub(crate) is_available: bool,
    pub(crate) description: Option<String>,
    pub(crate) image: Option<String>,
}

impl Product {
    pub(crate) fn from_parts(id: ProductId, draft: ProductDraft) -> Self {
        Self {
            id, name: draft.name, category: draft.category, price: draft.price,
            is_available: draft.stock_quantity > 0, stock_quantity: draft.stock_quantity,
            description: draft.description, image: draft.image,
        }
    }

    pub fn id(&self) -> ProductId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn category(&self) -> &str { &self.category }
    pub fn price(&self) -> Price { self.price }
    pub fn stock_quantity(&self) -> u32 { self.stock_quantity }
    pub fn is_available(&self) -> bool { self.is_available }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn image(&self) -> Option<&str> { self.image.as_deref() }

    pub fn has_stock_for(&self, qty: u32) -> bool { self.stock_quantity >= qty }
}

/// Admin-side input for creating or replacing a catalog entry.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Price,
    pub stock_quantity: u32,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

fn validate_price(price: &Price) -> Result<(), ValidationError> {
    if price.amount() > MAX_UNIT_PRICE {
        return Err(ValidationError::new("price_too_large"));
    }
    Ok(())
}
