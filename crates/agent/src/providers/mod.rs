//! HTTP clients for the hosted model APIs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;

use parceldesk_core::config::{LlmConfig, LlmProvider};

use crate::llm::{LlmClient, LlmError};

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

/// Builds the client selected by `llm.provider`.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let http = http_client(config.timeout_secs)?;
    let api_key = config.api_key.as_ref().map(|key| key.expose_secret().to_string());

    match config.provider {
        LlmProvider::Anthropic => {
            let api_key = api_key
                .filter(|key| !key.trim().is_empty())
                .ok_or(LlmError::MissingCredentials { provider: anthropic::PROVIDER })?;
            Ok(Arc::new(AnthropicClient::new(http, api_key, config.base_url.as_deref())))
        }
        LlmProvider::OpenAi => {
            Ok(Arc::new(OpenAiCompatibleClient::new(http, api_key, config.base_url.as_deref())))
        }
    }
}

fn http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(LlmError::Client)
}

/// Turns a non-success response into [`LlmError::Api`], keeping the body for
/// the escalation reason.
async fn api_error(provider: &'static str, response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body.chars().take(500).collect(),
        Err(error) => format!("<unreadable body: {error}>"),
    };
    LlmError::Api { provider, status, body }
}
