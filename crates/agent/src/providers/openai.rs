use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parceldesk_core::domain::conversation::{ToolCall, Turn};

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, StopReason};

pub const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and compatible servers (Ollama, vLLM).
pub struct OpenAiCompatibleClient {
    http: Client,
    auth_header: Option<String>,
    completions_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl Message {
    fn text(role: &'static str, content: String) -> Self {
        Self { role, content: Some(content), tool_call_id: None, tool_calls: None }
    }
}

#[derive(Debug, Serialize)]
struct FunctionTool {
    r#type: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments.
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

impl OpenAiCompatibleClient {
    pub fn new(http: Client, api_key: Option<String>, base_url: Option<&str>) -> Self {
        let base = base_url.map_or(DEFAULT_BASE_URL, |url| url.trim_end_matches('/'));
        Self {
            http,
            auth_header: api_key
                .filter(|key| !key.trim().is_empty())
                .map(|key| format!("Bearer {key}")),
            completions_url: format!("{base}/chat/completions"),
        }
    }

    fn build_request(request: CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = request.system_text() {
            messages.push(Message::text("system", system));
        }
        for turn in &request.turns {
            match turn {
                Turn::System { .. } => {}
                Turn::User { content } => messages.push(Message::text("user", content.clone())),
                Turn::Assistant { content, tool_calls } => messages.push(Message {
                    role: "assistant",
                    content: if content.is_empty() { None } else { Some(content.clone()) },
                    tool_call_id: None,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls.iter().map(to_wire_call).collect())
                    },
                }),
                Turn::Tool { result } => messages.push(Message {
                    role: "tool",
                    content: Some(result.to_wire().to_string()),
                    tool_call_id: Some(result.call_id.clone()),
                    tool_calls: None,
                }),
            }
        }

        ChatRequest {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request
                .tools
                .into_iter()
                .map(|tool| FunctionTool {
                    r#type: "function",
                    function: FunctionDefinition {
                        name: tool.name,
                        description: tool.description,
                        parameters: tool.input_schema,
                    },
                })
                .collect(),
        }
    }

    fn parse_response(response: ChatResponse) -> Result<Completion, LlmError> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LlmError::MalformedResponse { provider: PROVIDER, detail: "no choices".to_string() }
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(from_wire_call)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            stop_reason: choice.finish_reason.as_deref().map(StopReason::parse),
        })
    }
}

fn to_wire_call(call: &ToolCall) -> WireToolCall {
    WireToolCall {
        id: call.id.clone(),
        r#type: function_type(),
        function: WireFunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        },
    }
}

fn from_wire_call(call: WireToolCall) -> Result<ToolCall, LlmError> {
    let arguments = if call.function.arguments.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(&call.function.arguments).map_err(|error| {
            LlmError::MalformedResponse {
                provider: PROVIDER,
                detail: format!("arguments for `{}` are not JSON: {error}", call.function.name),
            }
        })?
    };
    Ok(ToolCall { id: call.id, name: call.function.name, arguments })
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::build_request(request);
        let mut call = self.http.post(&self.completions_url).json(&body);
        if let Some(auth) = &self.auth_header {
            call = call.header("Authorization", auth);
        }

        let response =
            call.send().await.map_err(|source| LlmError::Transport { provider: PROVIDER, source })?;
        if !response.status().is_success() {
            return Err(super::api_error(PROVIDER, response).await);
        }

        let parsed: ChatResponse = response.json().await.map_err(|error| {
            LlmError::MalformedResponse { provider: PROVIDER, detail: error.to_string() }
        })?;
        Self::parse_response(parsed)
    }
}
