use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Send,
    Revise,
    Escalate,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Revise => "revise",
            Self::Escalate => "escalate",
        }
    }

    /// Unknown recommendations are treated as `Escalate`.
    pub fn parse_or_escalate(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "send" => Self::Send,
            "revise" => Self::Revise,
            _ => Self::Escalate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub issues: Vec<String>,
    pub recommendation: Recommendation,
}

impl ValidationResult {
    pub fn approve() -> Self {
        Self { passed: true, issues: Vec::new(), recommendation: Recommendation::Send }
    }

    pub fn reject(issue: impl Into<String>) -> Self {
        Self { passed: false, issues: vec![issue.into()], recommendation: Recommendation::Escalate }
    }

    pub fn permits_dispatch(&self) -> bool {
        self.passed && self.recommendation == Recommendation::Send
    }

    pub fn escalation_reason(&self) -> String {
        if !self.passed {
            return format!("output validation failed: {}", self.issues.join("; "));
        }
        format!("output validation recommended `{}`", self.recommendation.as_str())
    }
}

/// What to conclude when the validator's output cannot be parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFallback {
    /// Unparsable output is a failed validation recommending escalation.
    #[default]
    Strict,
    /// Unparsable output passes when the draft looks like a finished email.
    EmailShape,
}

impl ValidationFallback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::EmailShape => "email_shape",
        }
    }

    pub fn resolve(&self, draft: &str, identity_resolved: bool) -> ValidationResult {
        match self {
            Self::Strict => ValidationResult::reject("could not validate response format"),
            Self::EmailShape => {
                let greeting = draft.contains("Dear") || draft.contains("Hi");
                if draft.chars().count() > 50 && (greeting || identity_resolved) {
                    ValidationResult::approve()
                } else {
                    ValidationResult::reject("could not validate response format")
                }
            }
        }
    }
}

impl std::str::FromStr for ValidationFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "email_shape" => Ok(Self::EmailShape),
            other => Err(format!(
                "unsupported validation fallback `{other}` (expected strict|email_shape)"
            )),
        }
    }
}
