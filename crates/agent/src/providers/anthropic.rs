use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parceldesk_core::domain::conversation::{ToolCall, Turn};

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, StopReason};

pub const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    messages_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDef>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<InputBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
struct ToolDef {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

impl AnthropicClient {
    pub fn new(http: Client, api_key: String, base_url: Option<&str>) -> Self {
        let base = base_url.map_or(DEFAULT_BASE_URL, |url| url.trim_end_matches('/'));
        Self { http, api_key, messages_url: format!("{base}/v1/messages") }
    }

    fn build_request(request: CompletionRequest) -> MessagesRequest {
        MessagesRequest {
            system: request.system_text(),
            model: request.model,
            max_tokens: request.max_tokens,
            messages: to_messages(&request.turns),
            tools: request
                .tools
                .into_iter()
                .map(|tool| ToolDef {
                    name: tool.name,
                    description: tool.description,
                    input_schema: tool.input_schema,
                })
                .collect(),
            temperature: request.temperature,
        }
    }

    fn parse_response(response: MessagesResponse) -> Completion {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseBlock::Text { text } => texts.push(text),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, arguments: input });
                }
                ResponseBlock::Unsupported => {}
            }
        }
        Completion {
            text: texts.join("\n"),
            tool_calls,
            stop_reason: response.stop_reason.as_deref().map(StopReason::parse),
        }
    }
}

/// Maps turns onto alternating user/assistant messages. Consecutive tool
/// results travel together in one user message.
fn to_messages(turns: &[Turn]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();
    for turn in turns {
        match turn {
            Turn::System { .. } => {}
            Turn::User { content } => messages.push(Message {
                role: "user",
                content: MessageContent::Text(content.clone()),
            }),
            Turn::Assistant { content, tool_calls } if tool_calls.is_empty() => {
                messages.push(Message {
                    role: "assistant",
                    content: MessageContent::Text(content.clone()),
                });
            }
            Turn::Assistant { content, tool_calls } => {
                let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                if !content.trim().is_empty() {
                    blocks.push(InputBlock::Text { text: content.clone() });
                }
                blocks.extend(tool_calls.iter().map(|call| InputBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                messages.push(Message { role: "assistant", content: MessageContent::Blocks(blocks) });
            }
            Turn::Tool { result } => {
                let block = InputBlock::ToolResult {
                    tool_use_id: result.call_id.clone(),
                    content: result.to_wire().to_string(),
                    is_error: if result.success { None } else { Some(true) },
                };
                match messages.last_mut() {
                    Some(Message { role: "user", content: MessageContent::Blocks(blocks) }) => {
                        blocks.push(block);
                    }
                    _ => messages
                        .push(Message { role: "user", content: MessageContent::Blocks(vec![block]) }),
                }
            }
        }
    }
    messages
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::build_request(request);
        let response = self
            .http
            .post(&self.messages_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Transport { provider: PROVIDER, source })?;

        if !response.status().is_success() {
            return Err(super::api_error(PROVIDER, response).await);
        }

        let parsed: MessagesResponse = response.json().await.map_err(|error| {
            LlmError::MalformedResponse { provider: PROVIDER, detail: error.to_string() }
        })?;
        Ok(Self::parse_response(parsed))
    }
}
