use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use parceldesk_core::domain::case::Case;
use parceldesk_core::domain::validation::{Recommendation, ValidationFallback, ValidationResult};
use parceldesk_core::errors::StepError;

use crate::extract;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{PromptBook, FALLBACK_DRAFT};

#[async_trait]
pub trait ReplyValidator: Send + Sync {
    /// Checks `case.draft` against the records gathered for the case.
    async fn validate(&self, case: &Case) -> Result<ValidationResult, StepError>;
}

pub struct LlmValidator {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    prompts: Arc<PromptBook>,
    fallback: ValidationFallback,
}

impl LlmValidator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        max_tokens: u32,
        prompts: Arc<PromptBook>,
        fallback: ValidationFallback,
    ) -> Self {
        Self { client, model: model.into(), max_tokens, prompts, fallback }
    }
}

#[async_trait]
impl ReplyValidator for LlmValidator {
    async fn validate(&self, case: &Case) -> Result<ValidationResult, StepError> {
        let draft = case.draft.as_deref().unwrap_or(FALLBACK_DRAFT);
        let request = CompletionRequest::prompt(
            self.model.clone(),
            self.prompts.validation_system(),
            self.prompts.validation_user(&case.email, case.identity.as_ref(), &case.orders, draft),
            self.max_tokens,
        );
        let completion = self
            .client
            .complete(request)
            .await
            .map_err(|error| StepError::Validation(error.to_string()))?;

        Ok(parse_validation(&completion.text, self.fallback, draft, case.identity.is_some()))
    }
}

/// Reads the validator's verdict, deferring to `fallback` when no JSON verdict
/// can be found.
pub fn parse_validation(
    text: &str,
    fallback: ValidationFallback,
    draft: &str,
    identity_resolved: bool,
) -> ValidationResult {
    match extract::json_object(text, "passed") {
        Some(object) => from_object(&object),
        None => fallback.resolve(draft, identity_resolved),
    }
}

fn from_object(object: &Map<String, Value>) -> ValidationResult {
    let passed = object.get("passed").and_then(Value::as_bool).unwrap_or(false);
    let issues = object
        .get("issues")
        .and_then(Value::as_array)
        .map(|issues| {
            issues.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<String>>()
        })
        .unwrap_or_default();
    let recommendation = object
        .get("recommendation")
        .and_then(Value::as_str)
        .map_or(Recommendation::Escalate, Recommendation::parse_or_escalate);

    ValidationResult { passed, issues, recommendation }
}
