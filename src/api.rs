//! HTTP surface over the catalog, the order ledger and the reports.

use axum::{extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post, put}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use crate::domain::aggregates::{Order, OrderStatus, PlaceOrder, Product, ProductDraft, Transition};
use crate::domain::value_objects::{OrderId, Price, ProductId, UserId};
use crate::store::{DashboardSummary, OrderFilter, Stores};
use crate::sync::{SyncHandle, SyncReconciler, SyncReport};
use crate::LedgerError;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub sync: Option<SyncHandle>,
    pub reconciler: Option<Arc<SyncReconciler>>,
    pub low_stock_threshold: u32,
}

type ApiResult<T> = Result<T, LedgerError>;

impl LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ProductNotFound(_) | Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) | Self::Migration(_) | Self::CorruptRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("Server error: {self}");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!("Client error: {self}");
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront-ledger"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/search", get(search_products))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/orders", get(list_orders).post(place_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_status))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/sync", post(sync_now))
        .route("/api/v1/reports/summary", get(summary))
        .route("/api/v1/reports/status-counts", get(status_counts))
        .route("/api/v1/reports/low-stock", get(low_stock))
        .with_state(state)
}

#[derive(Debug, Deserialize)] pub struct ProductParams { pub category: Option<String>, pub min_price: Option<Price>, pub max_price: Option<Price> }

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductParams>) -> ApiResult<Json<Vec<Product>>> {
    let catalog = &s.stores.catalog;
    let products = match (p.min_price, p.max_price, p.category) {
        (None, None, Some(category)) => catalog.products_by_category(&category).await?,
        (None, None, None) => catalog.list_products().await?,
        (min, max, category) => {
            let in_range = catalog.products_by_price_range(min.unwrap_or_else(Price::zero), max.unwrap_or(Price::MAX)).await?;
            in_range.into_iter().filter(|p| category.as_deref().map_or(true, |c| p.category() == c)).collect()
        }
    };
    Ok(Json(products))
}

#[derive(Debug, Deserialize)] pub struct SearchParams { pub q: String }

async fn search_products(State(s): State<AppState>, Query(p): Query<SearchParams>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.stores.catalog.search_products(&p.q).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<ProductId>) -> ApiResult<Json<Product>> {
    Ok(Json(s.stores.catalog.get_product(id).await?))
}

async fn create_product(State(s): State<AppState>, Json(draft): Json<ProductDraft>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.stores.catalog.upsert_product(None, &draft).await?)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<ProductId>, Json(draft): Json<ProductDraft>) -> ApiResult<Json<Product>> {
    Ok(Json(s.stores.catalog.upsert_product(Some(id), &draft).await?))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<ProductId>) -> ApiResult<StatusCode> {
    s.stores.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(s.stores.catalog.categories().await?))
}

async fn list_orders(State(s): State<AppState>, Query(filter): Query<OrderFilter>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.stores.ledger.list_orders(filter).await?))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<OrderId>) -> ApiResult<Json<Order>> {
    Ok(Json(s.stores.ledger.get_order(id).await?))
}

async fn place_order(State(s): State<AppState>, Json(req): Json<PlaceOrder>) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = s.stores.ledger.place_order(req).await?;
    if let Some(sync) = &s.sync {
        sync.request_sync();
    }
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)] pub struct StatusRequest { pub status: OrderStatus }

#[derive(Debug, Serialize)]
pub struct StatusResponse { pub changed: bool, pub order: Order }

async fn update_status(State(s): State<AppState>, Path(id): Path<OrderId>, Json(r): Json<StatusRequest>) -> ApiResult<Json<StatusResponse>> {
    let transition = s.stores.ledger.update_status(id, r.status).await?;
    status_response(&s, id, transition).await
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<OrderId>) -> ApiResult<Json<StatusResponse>> {
    let transition = s.stores.ledger.cancel_order(id).await?;
    status_response(&s, id, transition).await
}

async fn status_response(s: &AppState, id: OrderId, transition: Transition) -> ApiResult<Json<StatusResponse>> {
    let changed = match transition {
        Transition::Changed { to, .. } => {
            if let Some(sync) = &s.sync {
                sync.push_status(id, to);
            }
            true
        }
        Transition::Unchanged => false,
    };
    Ok(Json(StatusResponse { changed, order: s.stores.ledger.get_order(id).await? }))
}

async fn sync_now(State(s): State<AppState>) -> Response {
    let Some(reconciler) = &s.reconciler else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "Remote order service not configured" }))).into_response();
    };
    match reconciler.sync_all().await {
        Ok(report) => Json::<SyncReport>(report).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn summary(State(s): State<AppState>) -> ApiResult<Json<DashboardSummary>> {
    Ok(Json(s.stores.reports.summary().await?))
}

#[derive(Debug, Deserialize)] pub struct StatusCountParams { pub user_id: Option<UserId> }

async fn status_counts(State(s): State<AppState>, Query(p): Query<StatusCountParams>) -> ApiResult<Json<BTreeMap<OrderStatus, i64>>> {
    Ok(Json(s.stores.reports.count_by_status(p.user_id).await?))
}

#[derive(Debug, Deserialize)] pub struct LowStockParams { pub threshold: Option<u32> }

async fn low_stock(State(s): State<AppState>, Query(p): Query<LowStockParams>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.stores.reports.low_stock(p.threshold.unwrap_or(s.low_stock_threshold)).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;
    use crate::store::testing::test_pool;
    use crate::sync::reconciler::testing::{fast_policy, ScriptedRemote};

    async fn app() -> (Router, Stores) {
        let stores = Stores::new(test_pool().await);
        let state = AppState { stores: stores.clone(), sync: None, reconciler: None, low_stock_threshold: 5 };
        (router(state), stores)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }.unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn create_bread(app: &Router, stock: u32) -> i64 {
        let (status, body) = call(app, "POST", "/api/v1/products", Some(json!({
            "name": "Bread", "category": "Bakery", "price": "3.00", "stock_quantity": stock,
        }))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    fn order_body(product_id: i64, quantity: u32) -> Value {
        json!({ "user_id": Uuid::new_v4(), "product_id": product_id, "quantity": quantity, "delivery_method": "pickup" })
    }

    #[tokio::test]
    async fn test_order_lifecycle_over_http() {
        let (app, _) = app().await;
        let product_id = create_bread(&app, 5).await;

        let (status, order) = call(&app, "POST", "/api/v1/orders", Some(order_body(product_id, 2))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["total_price"], "6.00");
        assert_eq!(order["status"], "pending");
        let order_id = order["id"].as_i64().unwrap();

        let (_, product) = call(&app, "GET", &format!("/api/v1/products/{product_id}"), None).await;
        assert_eq!(product["stock_quantity"], 3);

        let (status, body) = call(&app, "POST", &format!("/api/v1/orders/{order_id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(body["order"]["status"], "cancelled");

        let (_, body) = call(&app, "POST", &format!("/api/v1/orders/{order_id}/cancel"), None).await;
        assert_eq!(body["changed"], false);
        let (_, product) = call(&app, "GET", &format!("/api/v1/products/{product_id}"), None).await;
        assert_eq!(product["stock_quantity"], 5);
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let (app, _) = app().await;
        let product_id = create_bread(&app, 1).await;

        let (status, body) = call(&app, "POST", "/api/v1/orders", Some(order_body(product_id, 2))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));

        let (status, _) = call(&app, "POST", "/api/v1/orders", Some(order_body(999, 1))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "POST", "/api/v1/orders", Some(json!({
            "user_id": Uuid::new_v4(), "product_id": product_id, "quantity": 1, "delivery_method": "home",
        }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, order) = call(&app, "POST", "/api/v1/orders", Some(order_body(product_id, 1))).await;
        let uri = format!("/api/v1/orders/{}/status", order["id"]);
        let (status, _) = call(&app, "PUT", &uri, Some(json!({ "status": "delivered" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "GET", "/api/v1/orders/424242", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_listing_and_reports() {
        let (app, _) = app().await;
        let product_id = create_bread(&app, 10).await;
        call(&app, "POST", "/api/v1/products", Some(json!({ "name": "Jam", "category": "Pantry", "price": "4.50", "stock_quantity": 2 }))).await;

        let user = Uuid::new_v4();
        let body = json!({ "user_id": user, "product_id": product_id, "quantity": 1, "delivery_method": "pickup" });
        let (_, first) = call(&app, "POST", "/api/v1/orders", Some(body.clone())).await;
        call(&app, "POST", "/api/v1/orders", Some(body)).await;
        call(&app, "POST", "/api/v1/orders", Some(order_body(product_id, 1))).await;
        call(&app, "PUT", &format!("/api/v1/orders/{}/status", first["id"]), Some(json!({ "status": "approved" }))).await;

        let (_, mine) = call(&app, "GET", &format!("/api/v1/orders?user_id={user}"), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 2);
        let (_, approved) = call(&app, "GET", &format!("/api/v1/orders?user_id={user}&status=approved"), None).await;
        assert_eq!(approved[0]["id"], first["id"]);

        let (_, counts) = call(&app, "GET", &format!("/api/v1/reports/status-counts?user_id={user}"), None).await;
        assert_eq!(counts, json!({ "pending": 1, "approved": 1, "delivered": 0, "cancelled": 0 }));

        let (_, summary) = call(&app, "GET", "/api/v1/reports/summary", None).await;
        assert_eq!(summary["total_orders"], 3);
        assert_eq!(summary["pending_orders"], 2);

        let (_, low) = call(&app, "GET", "/api/v1/reports/low-stock", None).await;
        assert_eq!(low[0]["name"], "Jam");
        let (_, found) = call(&app, "GET", "/api/v1/products/search?q=jam", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, pantry) = call(&app, "GET", "/api/v1/products?category=Pantry", None).await;
        assert_eq!(pantry[0]["name"], "Jam");
        let (_, cheap) = call(&app, "GET", "/api/v1/products?max_price=3.50", None).await;
        assert_eq!(cheap[0]["name"], "Bread");
        let (_, categories) = call(&app, "GET", "/api/v1/categories", None).await;
        assert_eq!(categories, json!(["Bakery", "Pantry"]));
    }

    #[tokio::test]
    async fn test_sync_endpoint() {
        let (app, _) = app().await;
        let (status, _) = call(&app, "POST", "/api/v1/sync", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let stores = Stores::new(test_pool().await);
        let reconciler = SyncReconciler::new(stores.ledger.clone(), Arc::new(ScriptedRemote::default()), fast_policy());
        let app = router(AppState { stores: stores.clone(), sync: None, reconciler: Some(Arc::new(reconciler)), low_stock_threshold: 5 });
        let product_id = create_bread(&app, 3).await;
        call(&app, "POST", "/api/v1/orders", Some(order_body(product_id, 1))).await;

        let (status, report) = call(&app, "POST", "/api/v1/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["succeeded"], 1);
        assert_eq!(stores.reports.summary().await.unwrap().unsynced_orders, 0);
    }
}
