use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::classification::{ClassificationResult, QueryLabel};
use crate::domain::conversation::{ConversationHistory, Turn};
use crate::domain::customer::Customer;
use crate::domain::email::{InboundEmail, OutboundReply};
use crate::domain::escalation::EscalationId;
use crate::domain::order::OrderRecord;
use crate::domain::trace::{Trace, TraceRecord};
use crate::domain::validation::ValidationResult;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why a case ended with a canned reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CannedReason {
    PromptInjection,
    OutOfScope,
    UserNotFound,
    TechnicalError,
}

impl CannedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromptInjection => "prompt_injection",
            Self::OutOfScope => "out_of_scope",
            Self::UserNotFound => "user_not_found",
            Self::TechnicalError => "technical_error",
        }
    }

    /// Labels that short-circuit straight to a canned reply.
    pub fn for_label(label: QueryLabel) -> Option<Self> {
        match label {
            QueryLabel::PromptInjection => Some(Self::PromptInjection),
            QueryLabel::OutOfScope => Some(Self::OutOfScope),
            QueryLabel::OrderStatus | QueryLabel::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Dispatched { reply: OutboundReply },
    Escalated { escalation_id: EscalationId, reason: String },
    CannedReply { reason: CannedReason },
}

impl Outcome {
    pub fn routed_to(&self) -> RoutedTo {
        match self {
            Self::Dispatched { .. } => RoutedTo::AutomatedResponse,
            Self::Escalated { .. } => RoutedTo::HumanQueue,
            Self::CannedReply { .. } => RoutedTo::DefaultResponse,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutedTo {
    AutomatedResponse,
    HumanQueue,
    DefaultResponse,
    Error,
    Unknown,
}

impl RoutedTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutomatedResponse => "automated_response",
            Self::HumanQueue => "human_queue",
            Self::DefaultResponse => "default_response",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Changes produced by one step. Merged with [`Case::apply`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseDelta {
    pub classification: Option<ClassificationResult>,
    pub identity: Option<Customer>,
    pub orders: Vec<OrderRecord>,
    pub matched_order: Option<OrderRecord>,
    pub turns: Vec<Turn>,
    pub round_completed: bool,
    pub draft: Option<String>,
    pub validation: Option<ValidationResult>,
    pub escalation_reason: Option<String>,
    pub final_reply: Option<OutboundReply>,
    pub error: Option<String>,
}

impl CaseDelta {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub email: InboundEmail,
    pub received_at: DateTime<Utc>,
    pub classification: Option<ClassificationResult>,
    pub identity: Option<Customer>,
    pub orders: Vec<OrderRecord>,
    pub matched_order: Option<OrderRecord>,
    pub conversation: ConversationHistory,
    pub rounds_completed: u32,
    pub draft: Option<String>,
    pub validation: Option<ValidationResult>,
    pub escalation_reason: Option<String>,
    pub final_reply: Option<OutboundReply>,
    pub outcome: Option<Outcome>,
    pub trace: Trace,
    pub error: Option<String>,
}

impl Case {
    pub fn new(email: InboundEmail, received_at: DateTime<Utc>) -> Self {
        Self {
            id: CaseId::generate(),
            email,
            received_at,
            classification: None,
            identity: None,
            orders: Vec::new(),
            matched_order: None,
            conversation: ConversationHistory::default(),
            rounds_completed: 0,
            draft: None,
            validation: None,
            escalation_reason: None,
            final_reply: None,
            outcome: None,
            trace: Trace::default(),
            error: None,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn routed_to(&self) -> RoutedTo {
        self.outcome.as_ref().map_or(RoutedTo::Unknown, Outcome::routed_to)
    }

    /// Merges a step delta. Set-once fields reject a conflicting second value.
    /// The whole delta is checked first, so a rejected delta changes nothing.
    pub fn apply(&mut self, delta: CaseDelta) -> Result<(), DomainError> {
        if self.is_concluded() {
            return Err(DomainError::InvariantViolation(format!(
                "case {} is concluded and cannot change",
                self.id.as_str()
            )));
        }
        if delta.classification.is_some() && self.classification.is_some() {
            return Err(DomainError::InvariantViolation(
                "classification is produced once per case".to_owned(),
            ));
        }
        if delta.validation.is_some() && self.validation.is_some() {
            return Err(DomainError::InvariantViolation(
                "validation is produced once per case".to_owned(),
            ));
        }
        let new_identity = match (delta.identity, &self.identity) {
            (Some(identity), Some(existing)) if existing.id != identity.id => {
                return Err(DomainError::InvariantViolation(format!(
                    "identity already resolved to {}; refusing {}",
                    existing.id.as_str(),
                    identity.id.as_str()
                )));
            }
            (Some(identity), None) => {
                if !identity.owns_address(&self.email.sender_email) {
                    return Err(DomainError::InvariantViolation(
                        "identity does not match the sender address".to_owned(),
                    ));
                }
                Some(identity)
            }
            _ => None,
        };
        let conversation = self.conversation.appended(delta.turns)?;

        self.conversation = conversation;
        if new_identity.is_some() {
            self.identity = new_identity;
        }
        if delta.classification.is_some() {
            self.classification = delta.classification;
        }
        if delta.validation.is_some() {
            self.validation = delta.validation;
        }
        for order in delta.orders {
            match self.orders.iter_mut().find(|known| known.id == order.id) {
                Some(known) => *known = order,
                None => self.orders.push(order),
            }
        }
        if delta.matched_order.is_some() {
            self.matched_order = delta.matched_order;
        }
        if delta.round_completed {
            self.rounds_completed += 1;
        }
        if delta.draft.is_some() {
            self.draft = delta.draft;
        }
        if delta.escalation_reason.is_some() {
            self.escalation_reason = delta.escalation_reason;
        }
        if delta.final_reply.is_some() {
            self.final_reply = delta.final_reply;
        }
        if let Some(error) = delta.error {
            self.error = Some(match self.error.take() {
                Some(previous) => format!("{previous}; {error}"),
                None => error,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, record: TraceRecord) {
        self.trace.append(record);
    }

    /// Sets the terminal outcome. A case concludes exactly once.
    pub fn conclude(&mut self, outcome: Outcome) -> Result<(), DomainError> {
        if self.is_concluded() {
            return Err(DomainError::InvariantViolation(format!(
                "case {} already has an outcome",
                self.id.as_str()
            )));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}
