use std::sync::Arc;

use async_trait::async_trait;

use parceldesk_core::domain::conversation::{ToolCall, Turn};
use parceldesk_core::errors::StepError;

use crate::llm::{CompletionRequest, LlmClient};
use crate::tools;

/// One responder turn: draft text, tool requests, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponderOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ResponderOutput {
    pub fn draft(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { content: String::new(), tool_calls }
    }

    pub fn into_turn(self) -> Turn {
        Turn::Assistant { content: self.content, tool_calls: self.tool_calls }
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    /// Continues `turns`, which start with the system and user turns.
    async fn respond(&self, turns: &[Turn]) -> Result<ResponderOutput, StepError>;
}

pub struct LlmResponder {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl LlmResponder {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self { client, model: model.into(), max_tokens, temperature: 0.3 }
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(&self, turns: &[Turn]) -> Result<ResponderOutput, StepError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: None,
            turns: turns.to_vec(),
            tools: tools::tool_specs(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let completion = self
            .client
            .complete(request)
            .await
            .map_err(|error| StepError::Responder(error.to_string()))?;

        Ok(ResponderOutput { content: completion.text, tool_calls: completion.tool_calls })
    }
}
