use axum::{extract::State, Json};
use parceldesk_core::flows::SupportFlow;
use serde_json::{json, Value};

use crate::api::AppState;

pub async fn definition(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "mermaid": SupportFlow::render_mermaid(),
        "description": format!("{} Customer Support Agent Graph", state.company_name()),
    }))
}
