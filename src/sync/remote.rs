//! Remote order service: the authority local orders are pushed to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use crate::domain::aggregates::{DeliveryMethod, Order, OrderStatus};
use crate::domain::value_objects::{OrderId, Price, ProductId, UserId};

const SYNC_ORDERS_ENDPOINT: &str = "/api/orders/sync";
const UPDATE_STATUS_ENDPOINT: &str = "/api/orders/update-status";
const HEALTH_ENDPOINT: &str = "/health";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote order service unreachable")]
    Unreachable,

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Timeouts, transport failures and 5xx/429 responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) | Self::Unreachable => true,
            Self::Rejected { status } => *status >= 500 || *status == 429,
            Self::Cancelled => false,
        }
    }
}

/// Create-or-update payload keyed by the local order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub total_price: Price,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub delivery_address: Option<String>,
}

impl From<&Order> for OrderPayload {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(), user_id: order.user_id(), product_id: order.product_id(),
            product_name: order.product_name().to_string(), quantity: order.quantity(),
            unit_price: order.unit_price(), total_price: order.total_price(),
            delivery_method: order.delivery_method(), status: order.status(),
            order_date: order.order_date(), delivery_address: order.delivery_address().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Success must be unambiguous: `Ok(())` means the remote has durably
/// accepted the payload.
#[async_trait]
pub trait RemoteOrderService: Send + Sync {
    async fn is_reachable(&self) -> bool;
    async fn upsert_order(&self, order: &OrderPayload) -> Result<(), RemoteError>;
    async fn update_status(&self, update: &StatusUpdate) -> Result<(), RemoteError>;
}

/// JSON over HTTP(S) client for the remote order service.
pub struct HttpRemoteOrderService {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRemoteOrderService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), timeout })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn map_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if e.is_connect() {
            RemoteError::Unreachable
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl RemoteOrderService for HttpRemoteOrderService {
    async fn is_reachable(&self) -> bool {
        match self.client.get(self.url(HEALTH_ENDPOINT)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Remote order service health check failed: {e}");
                false
            }
        }
    }

    async fn upsert_order(&self, order: &OrderPayload) -> Result<(), RemoteError> {
        let response = self.client.post(self.url(SYNC_ORDERS_ENDPOINT)).json(order).send().await
            .map_err(|e| self.map_error(e))?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(RemoteError::Rejected { status: status.as_u16() }),
        }
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<(), RemoteError> {
        let response = self.client.put(self.url(UPDATE_STATUS_ENDPOINT)).json(update).send().await
            .map_err(|e| self.map_error(e))?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(RemoteError::Rejected { status: status.as_u16() }),
        }
    }
}
