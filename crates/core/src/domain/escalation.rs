use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::email::InboundEmail;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscalationId(pub String);

impl EscalationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A case parked for human review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationItem {
    pub id: EscalationId,
    pub email_input: InboundEmail,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
}

impl EscalationItem {
    pub fn open(email: InboundEmail, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: EscalationId::generate(),
            email_input: email,
            reason: reason.into(),
            timestamp: at,
            resolved: false,
        }
    }
}
