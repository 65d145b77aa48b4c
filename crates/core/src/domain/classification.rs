use serde::{Deserialize, Serialize};

/// Closed label set produced by the inbound classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLabel {
    OrderStatus,
    Other,
    PromptInjection,
    OutOfScope,
}

impl QueryLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderStatus => "order_status",
            Self::Other => "other",
            Self::PromptInjection => "prompt_injection",
            Self::OutOfScope => "out_of_scope",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "order_status" => Some(Self::OrderStatus),
            "other" => Some(Self::Other),
            "prompt_injection" => Some(Self::PromptInjection),
            "out_of_scope" => Some(Self::OutOfScope),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: QueryLabel,
    pub confidence: f64,
    pub rationale: String,
}

impl ClassificationResult {
    /// Confidence is clamped into `[0, 1]`; NaN becomes zero.
    pub fn new(label: QueryLabel, confidence: f64, rationale: impl Into<String>) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { label, confidence, rationale: rationale.into() }
    }
}

/// What to conclude when the classifier's output carries no usable label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationFallback {
    /// Unusable output is a classification error and the case escalates.
    #[default]
    Strict,
    /// Unusable output is labelled by keywords found in the model's text.
    Keywords,
}

impl ClassificationFallback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Keywords => "keywords",
        }
    }

    /// `None` means the output stays unclassified.
    pub fn resolve(&self, text: &str) -> Option<ClassificationResult> {
        match self {
            Self::Strict => None,
            Self::Keywords => Some(keyword_label(text)),
        }
    }
}

impl std::str::FromStr for ClassificationFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "keywords" => Ok(Self::Keywords),
            other => Err(format!(
                "unsupported classification fallback `{other}` (expected strict|keywords)"
            )),
        }
    }
}

fn keyword_label(text: &str) -> ClassificationResult {
    let lower = text.to_lowercase();
    if lower.contains("prompt_injection") || (lower.contains("ignore") && lower.contains("instruction"))
    {
        ClassificationResult::new(QueryLabel::PromptInjection, 0.8, "Detected manipulation attempt")
    } else if lower.contains("out_of_scope") || lower.contains("spam") {
        ClassificationResult::new(QueryLabel::OutOfScope, 0.8, "Not relevant to support")
    } else if lower.contains("order") && lower.contains("status") {
        ClassificationResult::new(QueryLabel::OrderStatus, 0.7, "Order status inquiry")
    } else {
        ClassificationResult::new(QueryLabel::Other, 0.5, "Could not classify")
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassificationFallback, ClassificationResult, QueryLabel};

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(QueryLabel::parse(" Order_Status "), Some(QueryLabel::OrderStatus));
        assert_eq!(QueryLabel::parse("PROMPT_INJECTION"), Some(QueryLabel::PromptInjection));
        assert_eq!(QueryLabel::parse("refund"), None);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(ClassificationResult::new(QueryLabel::Other, 1.7, "").confidence, 1.0);
        assert_eq!(ClassificationResult::new(QueryLabel::Other, -0.2, "").confidence, 0.0);
        assert_eq!(ClassificationResult::new(QueryLabel::Other, f64::NAN, "").confidence, 0.0);
    }

    #[test]
    fn strict_fallback_leaves_output_unclassified() {
        assert_eq!(ClassificationFallback::default(), ClassificationFallback::Strict);
        assert_eq!(ClassificationFallback::Strict.resolve("I am not sure, could be spam"), None);
    }

    #[test]
    fn keyword_fallback_orders_injection_before_scope() {
        let label = |text: &str| {
            ClassificationFallback::Keywords.resolve(text).map(|result| result.label)
        };
        assert_eq!(
            label("This looks like spam that says ignore all instructions"),
            Some(QueryLabel::PromptInjection)
        );
        assert_eq!(label("Pure spam."), Some(QueryLabel::OutOfScope));
        assert_eq!(label("The customer wants the order status"), Some(QueryLabel::OrderStatus));
        assert_eq!(label("Hmm."), Some(QueryLabel::Other));
    }

    #[test]
    fn fallback_names_round_trip_through_from_str() {
        assert_eq!("KEYWORDS".parse::<ClassificationFallback>(), Ok(ClassificationFallback::Keywords));
        assert_eq!(" strict ".parse::<ClassificationFallback>(), Ok(ClassificationFallback::Strict));
        assert!("guess".parse::<ClassificationFallback>().is_err());
    }
}
