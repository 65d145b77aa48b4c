use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use parceldesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use parceldesk_core::domain::case::{Case, CaseDelta};
use parceldesk_core::domain::conversation::{ToolCall, ToolResult, Turn};
use parceldesk_core::domain::customer::{Customer, CustomerId};
use parceldesk_core::domain::order::{OrderId, OrderRecord};
use parceldesk_core::errors::StepError;
use parceldesk_db::RecordStore;

use crate::guardrails::{ToolDecision, ToolPolicy};
use crate::llm::ToolSpec;

pub const MAX_LOOKBACK_DAYS: u32 = 365;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolName {
    GetUserByEmail,
    GetOrdersForUser,
    GetOrderById,
}

impl ToolName {
    pub const ALL: [ToolName; 3] =
        [ToolName::GetUserByEmail, ToolName::GetOrdersForUser, ToolName::GetOrderById];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetUserByEmail => "get_user_by_email",
            Self::GetOrdersForUser => "get_orders_for_user",
            Self::GetOrderById => "get_order_by_id",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == value)
    }

    fn spec(&self) -> ToolSpec {
        let (description, input_schema) = match self {
            Self::GetUserByEmail => (
                "Look up a customer by their email address.",
                json!({
                    "type": "object",
                    "properties": {
                        "email": {"type": "string", "description": "The email address to look up"}
                    },
                    "required": ["email"]
                }),
            ),
            Self::GetOrdersForUser => (
                "Get all orders for a user placed within the last N days, newest first.",
                json!({
                    "type": "object",
                    "properties": {
                        "user_id": {"type": "string", "description": "The user ID to fetch orders for"},
                        "days": {"type": "integer", "description": "Number of days to look back (default 14)"}
                    },
                    "required": ["user_id"]
                }),
            ),
            Self::GetOrderById => (
                "Get details for a specific order by its order ID.",
                json!({
                    "type": "object",
                    "properties": {
                        "order_id": {"type": "string", "description": "The order ID to look up"}
                    },
                    "required": ["order_id"]
                }),
            ),
        };
        ToolSpec { name: self.as_str().to_string(), description: description.to_string(), input_schema }
    }
}

/// The tool catalog offered to the responder.
pub fn tool_specs() -> Vec<ToolSpec> {
    ToolName::ALL.iter().map(ToolName::spec).collect()
}

/// A tool call with its arguments checked for shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolRequest {
    LookupUser { email: String },
    OrdersForUser { user_id: String, days: Option<u32> },
    OrderById { order_id: String },
}

impl ToolRequest {
    /// Unknown tools and malformed arguments come back as the rejected result
    /// to hand to the model.
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolResult> {
        let Some(tool) = ToolName::parse(&call.name) else {
            return Err(ToolResult::rejected(
                &call.id,
                "unknown_tool",
                format!("Unknown tool: {}", call.name),
            ));
        };

        match tool {
            ToolName::GetUserByEmail => {
                Ok(Self::LookupUser { email: required_string(call, "email")? })
            }
            ToolName::GetOrdersForUser => Ok(Self::OrdersForUser {
                user_id: required_string(call, "user_id")?,
                days: optional_days(call)?,
            }),
            ToolName::GetOrderById => {
                Ok(Self::OrderById { order_id: required_string(call, "order_id")? })
            }
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            Self::LookupUser { .. } => ToolName::GetUserByEmail,
            Self::OrdersForUser { .. } => ToolName::GetOrdersForUser,
            Self::OrderById { .. } => ToolName::GetOrderById,
        }
    }
}

fn required_string(call: &ToolCall, field: &str) -> Result<String, ToolResult> {
    match call.arguments.get(field).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ToolResult::rejected(
            &call.id,
            "invalid_arguments",
            format!("`{}` requires a string `{field}` argument", call.name),
        )),
    }
}

/// Fractional days round to the nearest whole day; the result is clamped to
/// `1..=MAX_LOOKBACK_DAYS`.
fn optional_days(call: &ToolCall) -> Result<Option<u32>, ToolResult> {
    let value = match call.arguments.get("days") {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let max = i64::from(MAX_LOOKBACK_DAYS);
    let whole = match value.as_i64() {
        Some(days) => days,
        None => match value.as_f64().map(f64::round) {
            // Bounded before the cast, so it is exact.
            Some(days) if days.is_finite() => days.clamp(0.0, f64::from(MAX_LOOKBACK_DAYS) + 1.0) as i64,
            _ => {
                return Err(ToolResult::rejected(
                    &call.id,
                    "invalid_arguments",
                    "`days` must be a number of days",
                ))
            }
        },
    };
    u32::try_from(whole.clamp(1, max))
        .map(Some)
        .map_err(|_| ToolResult::rejected(&call.id, "invalid_arguments", "`days` is out of range"))
}

/// What one round of tool calls produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolRound {
    pub results: Vec<ToolResult>,
    pub identity: Option<Customer>,
    pub orders: Vec<OrderRecord>,
    pub matched_order: Option<OrderRecord>,
    pub tools_called: Vec<String>,
}

impl ToolRound {
    pub fn into_delta(self) -> CaseDelta {
        CaseDelta {
            turns: self.results.into_iter().map(|result| Turn::Tool { result }).collect(),
            identity: self.identity,
            orders: self.orders,
            matched_order: self.matched_order,
            round_completed: true,
            ..CaseDelta::default()
        }
    }
}

/// Runs tool calls against the record store under a case's [`ToolPolicy`].
/// Policy refusals are written to the audit sink as `tool.denied`.
#[derive(Clone)]
pub struct ToolExecutor {
    store: RecordStore,
    default_lookback_days: u32,
    audit: Arc<dyn AuditSink>,
}

impl ToolExecutor {
    pub fn new(store: RecordStore, default_lookback_days: u32, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, default_lookback_days, audit }
    }

    /// Answers every call exactly once, in request order. An identity
    /// resolved by an earlier call is visible to later calls in the round.
    /// Store failures abort the round.
    pub async fn execute_round(
        &self,
        case: &Case,
        calls: &[ToolCall],
        now: DateTime<Utc>,
    ) -> Result<ToolRound, StepError> {
        let mut policy = ToolPolicy::for_case(case);
        let mut round = ToolRound::default();

        for call in calls {
            round.tools_called.push(call.name.clone());
            let result = match ToolRequest::from_call(call) {
                Ok(request) => match policy.evaluate(&request) {
                    ToolDecision::Allow => {
                        self.run(case, &mut policy, &mut round, &call.id, request, now).await?
                    }
                    ToolDecision::Deny { reason_code, message } => {
                        self.denied(case, &call.id, request.tool(), reason_code, message)
                    }
                },
                Err(rejected) => rejected,
            };
            round.results.push(result);
        }
        Ok(round)
    }

    async fn run(
        &self,
        case: &Case,
        policy: &mut ToolPolicy,
        round: &mut ToolRound,
        call_id: &str,
        request: ToolRequest,
        now: DateTime<Utc>,
    ) -> Result<ToolResult, StepError> {
        match request {
            ToolRequest::LookupUser { email } => {
                let Some(customer) =
                    self.store.customers.find_by_email(&email).await.map_err(store_error)?
                else {
                    return Ok(ToolResult::ok(
                        call_id,
                        json!({"found": false, "error": format!("No user found with email: {email}")}),
                    ));
                };
                if let ToolDecision::Deny { reason_code, message } = policy.admit_identity(&customer) {
                    return Ok(self.denied(case, call_id, ToolName::GetUserByEmail, reason_code, message));
                }
                round.identity = policy.identity().cloned();
                Ok(ToolResult::ok(
                    call_id,
                    json!({
                        "found": true,
                        "user_id": customer.id.as_str(),
                        "email": customer.email,
                        "name": customer.name,
                    }),
                ))
            }
            ToolRequest::OrdersForUser { user_id, days } => {
                let days = days.unwrap_or(self.default_lookback_days);
                let orders = self
                    .store
                    .recent_orders(&CustomerId(user_id.clone()), days, now)
                    .await
                    .map_err(store_error)?;
                let mut payload = json!({
                    "found": !orders.is_empty(),
                    "count": orders.len(),
                    "orders": to_json(&orders)?,
                });
                if orders.is_empty() {
                    payload["message"] =
                        json!(format!("No orders found for user {user_id} in the last {days} days"));
                }
                round.orders.extend(orders);
                Ok(ToolResult::ok(call_id, payload))
            }
            ToolRequest::OrderById { order_id } => {
                let Some(order) = self
                    .store
                    .orders
                    .find_by_id(&OrderId(order_id.clone()))
                    .await
                    .map_err(store_error)?
                else {
                    return Ok(ToolResult::ok(
                        call_id,
                        json!({"found": false, "error": format!("No order found with ID: {order_id}")}),
                    ));
                };
                if let ToolDecision::Deny { reason_code, message } = policy.screen_order(&order) {
                    return Ok(self.denied(case, call_id, ToolName::GetOrderById, reason_code, message));
                }
                let mut payload = to_json(&order)?;
                if let Value::Object(fields) = &mut payload {
                    fields.insert("found".to_string(), Value::Bool(true));
                }
                round.matched_order = Some(order);
                Ok(ToolResult::ok(call_id, payload))
            }
        }
    }

    fn denied(
        &self,
        case: &Case,
        call_id: &str,
        tool: ToolName,
        reason_code: &'static str,
        message: String,
    ) -> ToolResult {
        warn!(
            event_name = "agent.tool.denied",
            correlation_id = case.id.as_str(),
            tool = tool.as_str(),
            reason_code,
            "tool call rejected by policy"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(case.id.clone()),
                case.id.as_str(),
                "tool.denied",
                AuditCategory::Tooling,
                "tool_executor",
                AuditOutcome::Rejected,
            )
            .with_metadata("tool", tool.as_str())
            .with_metadata("reason_code", reason_code),
        );
        ToolResult::denied(call_id, reason_code, message)
    }
}

fn store_error(error: parceldesk_db::RepositoryError) -> StepError {
    StepError::Store(error.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StepError> {
    serde_json::to_value(value).map_err(|error| StepError::Store(error.to_string()))
}
