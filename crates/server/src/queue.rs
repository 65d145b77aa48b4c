use axum::{
    extract::{Path, State},
    Json,
};
use parceldesk_core::domain::escalation::EscalationId;
use serde_json::{json, Value};
use tracing::info;

use crate::api::{ApiError, AppState, API_CORRELATION_ID};

pub async fn list_queue(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let queue = state
        .store()
        .escalations
        .list()
        .await
        .map_err(|error| ApiError::store("list_escalations", error))?;
    Ok(Json(json!({ "queue": queue })))
}

pub async fn resolve_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let resolved = state
        .store()
        .escalations
        .resolve(&EscalationId(id.clone()))
        .await
        .map_err(|error| ApiError::store("resolve_escalation", error))?;
    if !resolved {
        return Err(ApiError::not_found("Queue item not found"));
    }

    info!(
        event_name = "api.queue.resolved",
        correlation_id = API_CORRELATION_ID,
        escalation_id = %id,
        "escalation marked resolved"
    );
    Ok(Json(json!({ "success": true, "message": format!("Item {id} marked as resolved") })))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_support::{app, send};

    #[tokio::test]
    async fn escalated_cases_can_be_listed_and_resolved() {
        let (app, _) = app().await;
        let (_, processed) = send(
            &app,
            Method::POST,
            "/api/email/process",
            Some(json!({"sender_email": "jane.smith@email.com", "subject": "Refund", "body": "Refund please"})),
        )
        .await;
        assert_eq!(processed["routed_to"], "human_queue");
        assert_eq!(processed["escalation_reason"], "requires human review");

        let (_, queue) = send(&app, Method::GET, "/api/queue", None).await;
        let items = queue["queue"].as_array().expect("queue");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["resolved"], false);
        assert_eq!(items[0]["email_input"]["sender_email"], "jane.smith@email.com");

        let id = items[0]["id"].as_str().expect("id").to_string();
        let (status, body) = send(&app, Method::POST, &format!("/api/queue/{id}/resolve"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, queue) = send(&app, Method::GET, "/api/queue", None).await;
        assert_eq!(queue["queue"][0]["resolved"], true);
    }

    #[tokio::test]
    async fn resolving_an_unknown_item_is_not_found() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::POST, "/api/queue/missing/resolve", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "not found: Queue item not found");
    }
}
