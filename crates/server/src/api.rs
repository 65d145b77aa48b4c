//! JSON routes of the support router.
//!
//! - `POST /api/email/process`          - run one email through the router
//! - `GET  /api/email/sent`             - sent reply log
//! - `GET  /api/queue`                  - escalation queue
//! - `POST /api/queue/{id}/resolve`     - mark a queue item resolved
//! - `GET  /api/data/users`             - customer records
//! - `GET  /api/data/orders`            - orders, optionally `?user_id=&days=`
//! - `GET  /api/data/orders/{order_id}` - one order
//! - `GET  /api/graph/definition`       - Mermaid rendering of the routing graph

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parceldesk_agent::AgentRuntime;
use parceldesk_core::errors::{ApplicationError, InterfaceError};
use parceldesk_db::{RecordStore, RepositoryError};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::{email, graph, queue, records};

/// Correlation id for requests that are not tied to a case.
pub const API_CORRELATION_ID: &str = "api";

#[derive(Clone)]
pub struct AppState {
    runtime: Arc<AgentRuntime>,
}

impl AppState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> Arc<AgentRuntime> {
        self.runtime.clone()
    }

    pub fn store(&self) -> &RecordStore {
        self.runtime.store()
    }

    pub fn company_name(&self) -> &str {
        self.runtime.prompts().company_name()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/email/process", post(email::process_email))
        .route("/api/email/sent", get(email::sent_replies))
        .route("/api/queue", get(queue::list_queue))
        .route("/api/queue/{id}/resolve", post(queue::resolve_item))
        .route("/api/data/users", get(records::list_users))
        .route("/api/data/orders", get(records::list_orders))
        .route("/api/data/orders/{order_id}", get(records::get_order))
        .route("/api/graph/definition", get(graph::definition))
        .with_state(state)
}

pub fn cors() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("{} Customer Support Agent API", state.company_name()),
        "endpoints": {
            "process_email": "POST /api/email/process",
            "sent_emails": "GET /api/email/sent",
            "get_users": "GET /api/data/users",
            "get_orders": "GET /api/data/orders",
            "get_queue": "GET /api/queue",
            "resolve_queue_item": "POST /api/queue/{id}/resolve",
            "get_graph": "GET /api/graph/definition",
            "health": "GET /health",
        }
    }))
}

/// Interface error rendered as a JSON body with the matching status code.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self(ApplicationError::NotFound(message.into()).into_interface(API_CORRELATION_ID))
    }

    pub fn store(operation: &'static str, error: RepositoryError) -> Self {
        warn!(
            event_name = "api.store_error",
            correlation_id = API_CORRELATION_ID,
            operation,
            error = %error,
            "record store request failed"
        );
        Self(ApplicationError::Persistence(error.to_string()).into_interface(API_CORRELATION_ID))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({
            "error": self.0.user_message(),
            "detail": self.0.to_string(),
            "correlation_id": self.0.correlation_id(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use parceldesk_agent::{
        AgentRuntime, Classifier, PromptBook, ReplyValidator, Responder, ResponderOutput,
        RuntimeSettings,
    };
    use parceldesk_core::{
        Case, ClassificationResult, InMemoryAuditSink, InboundEmail, QueryLabel, StepError, Turn,
        ValidationResult,
    };
    use parceldesk_db::{DemoDataset, RecordStore};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, AppState};

    /// Labels by subject keyword so one router can reach every terminal.
    struct SubjectClassifier;

    #[async_trait]
    impl Classifier for SubjectClassifier {
        async fn classify(&self, email: &InboundEmail) -> Result<ClassificationResult, StepError> {
            let label = match email.subject.to_ascii_lowercase().as_str() {
                "weather" => QueryLabel::OutOfScope,
                "refund" => QueryLabel::Other,
                _ => QueryLabel::OrderStatus,
            };
            Ok(ClassificationResult::new(label, 0.9, "subject keyword"))
        }
    }

    struct DraftOnlyResponder;

    #[async_trait]
    impl Responder for DraftOnlyResponder {
        async fn respond(&self, _turns: &[Turn]) -> Result<ResponderOutput, StepError> {
            Ok(ResponderOutput::draft("Thanks for reaching out."))
        }
    }

    struct ApprovingValidator;

    #[async_trait]
    impl ReplyValidator for ApprovingValidator {
        async fn validate(&self, _case: &Case) -> Result<ValidationResult, StepError> {
            Ok(ValidationResult::approve())
        }
    }

    pub async fn app() -> (Router, RecordStore) {
        let store = RecordStore::in_memory();
        DemoDataset::load(&store, Utc::now()).await.expect("seed demo data");
        let runtime = AgentRuntime::new(
            Arc::new(SubjectClassifier),
            Arc::new(DraftOnlyResponder),
            Arc::new(ApprovingValidator),
            store.clone(),
            Arc::new(PromptBook::new("Northwind", "An online store")),
            Arc::new(InMemoryAuditSink::default()),
            RuntimeSettings { step_timeout: Duration::from_secs(5), ..RuntimeSettings::default() },
        );
        (router(AppState::new(Arc::new(runtime))), store)
    }

    pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }
}
