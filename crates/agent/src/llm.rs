use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use parceldesk_core::domain::conversation::{ToolCall, Turn};

/// A tool the model may request, with a JSON-schema description of its input.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    /// Conversation turns. `Turn::System` entries are folded into `system`
    /// by the providers.
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionRequest {
    /// Single-shot request: one system prompt, one user message, no tools.
    pub fn prompt(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            system: Some(system.into()),
            turns: vec![Turn::User { content: user.into() }],
            tools: Vec::new(),
            max_tokens,
            temperature: 0.0,
        }
    }

    /// The explicit `system` field joined with any system turns.
    pub fn system_text(&self) -> Option<String> {
        let mut parts: Vec<&str> = self.system.iter().map(String::as_str).collect();
        parts.extend(self.turns.iter().filter_map(|turn| match turn {
            Turn::System { content } => Some(content.as_str()),
            _ => None,
        }));
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" | "stop" => Self::EndTurn,
            "tool_use" | "tool_calls" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} credentials are not configured")]
    MissingCredentials { provider: &'static str },
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} api returned {status}: {body}")]
    Api { provider: &'static str, status: u16, body: String },
    #[error("{provider} returned an unusable response: {detail}")]
    MalformedResponse { provider: &'static str, detail: String },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}
