use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use parceldesk_core::domain::customer::CustomerId;
use parceldesk_core::domain::order::{OrderId, OrderRecord};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{ApiError, AppState};

const DEFAULT_ORDER_DAYS: u32 = 14;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub user_id: Option<String>,
    pub days: Option<u32>,
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = state
        .store()
        .customers
        .list()
        .await
        .map_err(|error| ApiError::store("list_customers", error))?;
    Ok(Json(json!({ "users": users })))
}

/// All orders, or one user's orders within the last `days` days.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Value>, ApiError> {
    let orders: Vec<OrderRecord> = match query.user_id.as_deref().map(str::trim) {
        Some(user_id) if !user_id.is_empty() => state
            .store()
            .recent_orders(
                &CustomerId(user_id.to_string()),
                query.days.unwrap_or(DEFAULT_ORDER_DAYS),
                Utc::now(),
            )
            .await
            .map_err(|error| ApiError::store("list_customer_orders", error))?,
        _ => state
            .store()
            .orders
            .list()
            .await
            .map_err(|error| ApiError::store("list_orders", error))?,
    };
    Ok(Json(json!({ "orders": orders })))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, ApiError> {
    state
        .store()
        .orders
        .find_by_id(&OrderId(order_id))
        .await
        .map_err(|error| ApiError::store("find_order", error))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}
