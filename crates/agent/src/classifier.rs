use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use parceldesk_core::domain::classification::{
    ClassificationFallback, ClassificationResult, QueryLabel,
};
use parceldesk_core::domain::email::InboundEmail;
use parceldesk_core::errors::StepError;

use crate::extract;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::PromptBook;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, email: &InboundEmail) -> Result<ClassificationResult, StepError>;
}

/// Labels inbound email with the guardrail model.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    prompts: Arc<PromptBook>,
    fallback: ClassificationFallback,
}

impl LlmClassifier {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        max_tokens: u32,
        prompts: Arc<PromptBook>,
        fallback: ClassificationFallback,
    ) -> Self {
        Self { client, model: model.into(), max_tokens, prompts, fallback }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, email: &InboundEmail) -> Result<ClassificationResult, StepError> {
        let request = CompletionRequest::prompt(
            self.model.clone(),
            self.prompts.classification_system(),
            self.prompts.classification_user(email),
            self.max_tokens,
        );
        let completion = self
            .client
            .complete(request)
            .await
            .map_err(|error| StepError::Classification(error.to_string()))?;
        parse_classification(&completion.text, self.fallback)
    }
}

/// Reads the model's answer. Output without a usable JSON label goes to
/// `fallback`; under the strict policy it is a classification error.
pub fn parse_classification(
    text: &str,
    fallback: ClassificationFallback,
) -> Result<ClassificationResult, StepError> {
    extract::json_object(text, "query_type")
        .and_then(|object| from_object(&object))
        .or_else(|| fallback.resolve(text))
        .ok_or_else(|| StepError::Classification("unparsable classifier output".to_string()))
}

fn from_object(object: &Map<String, Value>) -> Option<ClassificationResult> {
    let label = QueryLabel::parse(object.get("query_type")?.as_str()?)?;
    let confidence = object.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let rationale = object.get("reason").and_then(Value::as_str).unwrap_or_default();
    Some(ClassificationResult::new(label, confidence, rationale))
}

#[cfg(test)]
mod tests {
    use parceldesk_core::domain::classification::{ClassificationFallback, QueryLabel};
    use parceldesk_core::errors::StepError;

    use super::parse_classification;

    #[test]
    fn json_answer_is_used_verbatim() {
        let result = parse_classification(
            r#"{"query_type": "order_status", "confidence": 0.95, "reason": "tracking question"}"#,
            ClassificationFallback::Strict,
        )
        .expect("labelled");
        assert_eq!(result.label, QueryLabel::OrderStatus);
        assert!((result.confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(result.rationale, "tracking question");
    }

    #[test]
    fn strict_policy_rejects_prose_and_unknown_labels() {
        for text in [
            "I am not sure, could be spam",
            "order status, probably",
            r#"{"query_type": "refund", "reason": "order status"}"#,
        ] {
            let error = parse_classification(text, ClassificationFallback::Strict)
                .expect_err("unusable output is an error");
            assert_eq!(error, StepError::Classification("unparsable classifier output".into()));
            assert_eq!(
                error.escalation_reason(),
                "classification error: unparsable classifier output"
            );
        }
    }

    #[test]
    fn keyword_policy_labels_prose() {
        let result = parse_classification("order status, probably", ClassificationFallback::Keywords)
            .expect("keywords label the text");
        assert_eq!(result.label, QueryLabel::OrderStatus);

        let result = parse_classification(
            r#"{"query_type": "refund", "reason": "order status"}"#,
            ClassificationFallback::Keywords,
        )
        .expect("keywords label unknown json labels");
        assert_eq!(result.label, QueryLabel::OrderStatus);
    }
}
