use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

const AUTHORIZATION_KIND: &str = "authorization";

/// A tool invocation requested by the responder. `id` is opaque and only used
/// to pair the call with its result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Structured tool output fed back to the responder. Rejected calls carry
/// `success: false` and an error payload rather than failing the case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, payload: Value) -> Self {
        Self { call_id: call_id.into(), success: true, payload }
    }

    pub fn rejected(call_id: impl Into<String>, kind: &str, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            payload: serde_json::json!({ "error_kind": kind, "error": message.into() }),
        }
    }

    /// A call refused on ownership or identity grounds. `reason_code` names
    /// the rule that refused it.
    pub fn denied(call_id: impl Into<String>, reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            payload: serde_json::json!({
                "error_kind": AUTHORIZATION_KIND,
                "reason_code": reason_code,
                "error": message.into(),
            }),
        }
    }

    pub fn is_denial(&self) -> bool {
        !self.success
            && self.payload.get("error_kind").and_then(Value::as_str) == Some(AUTHORIZATION_KIND)
    }

    /// The wire body handed to the model: the payload object with the
    /// `success` flag merged in.
    pub fn to_wire(&self) -> Value {
        let mut body = match &self.payload {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_owned(), other.clone());
                map
            }
        };
        body.insert("success".to_owned(), Value::Bool(self.success));
        Value::Object(body)
    }
}

/// Checks a responder's tool-call batch: every call needs a non-blank id
/// that no other call in the batch shares.
pub fn check_tool_calls(calls: &[ToolCall]) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for call in calls {
        if call.id.trim().is_empty() {
            return Err(format!("tool call `{}` has no id", call.name));
        }
        if !seen.insert(call.id.as_str()) {
            return Err(format!("tool call id `{}` is used more than once", call.id));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System { content: String },
    User { content: String },
    Assistant { content: String, tool_calls: Vec<ToolCall> },
    Tool { result: ToolResult },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.turns.iter().find_map(|turn| match turn {
            Turn::System { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Appends turns in order, all or none. A responder turn may not follow
    /// tool calls that are still waiting for their results.
    pub fn append(&mut self, turns: Vec<Turn>) -> Result<(), DomainError> {
        *self = self.appended(turns)?;
        Ok(())
    }

    /// The history with `turns` appended; `self` is left untouched.
    pub fn appended(&self, turns: Vec<Turn>) -> Result<Self, DomainError> {
        let mut staged = self.clone();
        for turn in turns {
            staged.check_append(&turn)?;
            staged.turns.push(turn);
        }
        Ok(staged)
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { content, .. } if !content.trim().is_empty() => {
                Some(content.as_str())
            }
            _ => None,
        })
    }

    /// Text of the latest responder turn when that turn asked for no tools.
    pub fn final_draft(&self) -> Option<&str> {
        let (text, asked_for_tools) = self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { content, tool_calls } => {
                Some((content.as_str(), !tool_calls.is_empty()))
            }
            _ => None,
        })?;
        (!asked_for_tools && !text.trim().is_empty()).then_some(text)
    }

    /// Whether the most recent block of tool results holds a denial.
    pub fn latest_results_denied(&self) -> bool {
        self.turns
            .iter()
            .rev()
            .skip_while(|turn| !matches!(turn, Turn::Tool { .. }))
            .take_while(|turn| matches!(turn, Turn::Tool { .. }))
            .any(|turn| matches!(turn, Turn::Tool { result } if result.is_denial()))
    }

    pub fn tool_rounds(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| matches!(turn, Turn::Assistant { tool_calls, .. } if !tool_calls.is_empty()))
            .count()
    }

    /// Call ids from the latest assistant turn that have no result yet.
    pub fn unanswered_calls(&self) -> BTreeSet<String> {
        let mut pending = BTreeSet::new();
        for turn in &self.turns {
            match turn {
                Turn::Assistant { tool_calls, .. } => {
                    pending = tool_calls.iter().map(|call| call.id.clone()).collect();
                }
                Turn::Tool { result } => {
                    pending.remove(&result.call_id);
                }
                Turn::System { .. } | Turn::User { .. } => {}
            }
        }
        pending
    }

    fn check_append(&self, turn: &Turn) -> Result<(), DomainError> {
        match turn {
            Turn::Assistant { tool_calls, .. } => {
                check_tool_calls(tool_calls).map_err(DomainError::InvariantViolation)?;
                let pending = self.unanswered_calls();
                if !pending.is_empty() {
                    return Err(DomainError::InvariantViolation(format!(
                        "responder turn appended while tool calls await results: {pending:?}"
                    )));
                }
            }
            Turn::Tool { result } => {
                if !self.unanswered_calls().contains(&result.call_id) {
                    return Err(DomainError::InvariantViolation(format!(
                        "tool result `{}` does not answer a pending call",
                        result.call_id
                    )));
                }
            }
            Turn::System { .. } | Turn::User { .. } => {}
        }
        Ok(())
    }
}
