use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parceldesk_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// `healthy` only when the record store answers a trivial query.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let healthy = database.status == "healthy";

    let payload = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        service: HealthCheck {
            status: "healthy",
            detail: "parceldesk router accepting email".to_string(),
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customer").fetch_one(pool).await {
        Ok(customers) => HealthCheck {
            status: "healthy",
            detail: format!("record store reachable ({customers} customers)"),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("record store query failed: {error}") }
        }
    }
}
