use axum::{extract::State, Json};
use parceldesk_core::domain::case::{Case, Outcome, RoutedTo};
use parceldesk_core::domain::email::{InboundEmail, OutboundReply};
use parceldesk_core::domain::trace::TraceRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::api::{ApiError, AppState, API_CORRELATION_ID};

#[derive(Clone, Debug, Deserialize)]
pub struct ProcessEmailRequest {
    pub sender_email: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProcessEmailResponse {
    pub success: bool,
    pub response_email: Option<OutboundReply>,
    pub routed_to: RoutedTo,
    pub escalation_reason: Option<String>,
    pub trace: Vec<TraceRecord>,
    pub error: Option<String>,
}

impl ProcessEmailResponse {
    /// Canned replies report their reason code in `escalation_reason`.
    fn from_case(case: Case) -> Self {
        let routed_to = case.routed_to();
        let escalation_reason = match &case.outcome {
            Some(Outcome::CannedReply { reason }) => Some(reason.as_str().to_string()),
            _ => case.escalation_reason,
        };
        Self {
            success: true,
            routed_to,
            response_email: case.final_reply,
            escalation_reason,
            trace: case.trace.records().to_vec(),
            error: case.error,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response_email: None,
            routed_to: RoutedTo::Error,
            escalation_reason: None,
            trace: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Failures that never reach a case come back as `routed_to: error`.
pub async fn process_email(
    State(state): State<AppState>,
    Json(request): Json<ProcessEmailRequest>,
) -> Json<ProcessEmailResponse> {
    if request.sender_email.trim().is_empty() {
        return Json(ProcessEmailResponse::failed("sender_email is required"));
    }

    let runtime = state.runtime();
    let email = InboundEmail::new(request.sender_email.trim(), request.subject, request.body);
    match tokio::spawn(async move { runtime.process(email).await }).await {
        Ok(case) => Json(ProcessEmailResponse::from_case(case)),
        Err(join_error) => {
            error!(
                event_name = "api.email.process_aborted",
                correlation_id = API_CORRELATION_ID,
                error = %join_error,
                "email processing aborted before the case concluded"
            );
            Json(ProcessEmailResponse::failed(format!("email processing aborted: {join_error}")))
        }
    }
}

pub async fn sent_replies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let emails = state
        .store()
        .sent_replies
        .list()
        .await
        .map_err(|error| ApiError::store("list_sent_replies", error))?;
    Ok(Json(json!({ "emails": emails })))
}
