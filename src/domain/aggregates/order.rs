//! Order Aggregate
//!
//! An order snapshots the product name and unit price at checkout. After
//! creation only `status` and `synced` ever change.
//!
//! ```text
//! pending --approve--> approved --deliver--> delivered
//!    |                    |
//!    +------cancel--------+-----> cancelled   (stock restored)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{OrderId, Price, ProductId, UserId};
use crate::{LedgerError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) user_id: UserId,
    pub(crate) product_id: ProductId,
    pub(crate) product_name: String,
    pub(crate) quantity: u32,
    pub(crate) unit_price: Price,
    pub(crate) total_price: Price,
    pub(crate) delivery_method: DeliveryMethod,
    pub(crate) delivery_address: Option<String>,
    pub(crate) status: OrderStatus,
    pub(crate) order_date: DateTime<Utc>,
    pub(crate) synced: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod { Pickup, Home }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Approved, Delivered, Cancelled }

/// Outcome of applying a status change to a stored order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Already in the requested status; nothing is written.
    Unchanged,
    /// Status moves forward. `restock` is set for the move into `cancelled`.
    Changed { from: OrderStatus, to: OrderStatus, restock: bool },
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pickup => "pickup", Self::Home => "home" }
    }
}

impl FromStr for DeliveryMethod {
    type Err = LedgerError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pickup" => Ok(Self::Pickup),
            "home" => Ok(Self::Home),
            other => Err(LedgerError::CorruptRecord(format!("unknown delivery method '{other}'"))),
        }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [Self::Pending, Self::Approved, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Delivered => "delivered", Self::Cancelled => "cancelled" }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!((*self, next), (Pending, Approved) | (Approved, Delivered) | (Pending, Cancelled) | (Approved, Cancelled))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = LedgerError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
            .ok_or_else(|| LedgerError::CorruptRecord(format!("unknown order status '{s}'")))
    }
}

impl Order {
    /// Builds a freshly placed order from the product as it looks right now.
    pub(crate) fn place(id: OrderId, req: &PlaceOrder, product: &Product, order_date: DateTime<Utc>) -> Result<Self> {
        let total_price = product.price().times(req.quantity)
            .ok_or_else(|| LedgerError::Validation(format!("total price of {} x {} is out of range", req.quantity, product.price())))?;
        Ok(Self {
            id, user_id: req.user_id, product_id: product.id(), product_name: product.name().to_string(),
            quantity: req.quantity, unit_price: product.price(), total_price,
            delivery_method: req.delivery_method, delivery_address: req.normalized_address(),
            status: OrderStatus::Pending, order_date, synced: false,
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn product_id(&self) -> ProductId { self.product_id }
    pub fn product_name(&self) -> &str { &self.product_name }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn unit_price(&self) -> Price { self.unit_price }
    pub fn total_price(&self) -> Price { self.total_price }
    pub fn delivery_method(&self) -> DeliveryMethod { self.delivery_method }
    pub fn delivery_address(&self) -> Option<&str> { self.delivery_address.as_deref() }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn order_date(&self) -> DateTime<Utc> { self.order_date }
    pub fn is_synced(&self) -> bool { self.synced }

    /// Validates `next` against the state machine without mutating anything.
    pub fn plan_transition(&self, next: OrderStatus) -> Result<Transition> {
        if self.status == next { return Ok(Transition::Unchanged); }
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition { order_id: self.id, from: self.status, to: next });
        }
        Ok(Transition::Changed { from: self.status, to: next, restock: next == OrderStatus::Cancelled })
    }
}

/// Checkout request handed to the ledger.
#[derive(Clone, Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_delivery"))]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

impl PlaceOrder {
    pub fn new(user_id: UserId, product_id: ProductId, quantity: u32, delivery_method: DeliveryMethod, delivery_address: Option<String>) -> Self {
        Self { user_id, product_id, quantity, delivery_method, delivery_address }
    }

    // Pickup orders never carry an address.
    fn normalized_address(&self) -> Option<String> {
        match self.delivery_method {
            DeliveryMethod::Pickup => None,
            DeliveryMethod::Home => self.delivery_address.as_ref().map(|a| a.trim().to_string()),
        }
    }
}

fn validate_delivery(req: &PlaceOrder) -> std::result::Result<(), ValidationError> {
    let has_address = req.delivery_address.as_deref().is_some_and(|a| !a.trim().is_empty());
    if req.delivery_method == DeliveryMethod::Home && !has_address {
        return Err(ValidationError::new("home_delivery_requires_address"));
    }
    Ok(())
}
