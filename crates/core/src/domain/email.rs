use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmail {
    pub sender_email: String,
    pub subject: String,
    pub body: String,
}

impl InboundEmail {
    pub fn new(
        sender_email: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self { sender_email: sender_email.into(), subject: subject.into(), body: body.into() }
    }

    /// Header-style rendering shared by the classifier and responder prompts.
    pub fn render(&self) -> String {
        format!("From: {}\nSubject: {}\n\n{}", self.sender_email, self.subject, self.body)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl OutboundReply {
    pub fn reply_to(email: &InboundEmail, body: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            to_email: email.sender_email.clone(),
            subject: format!("Re: {}", email.subject),
            body: body.into(),
            timestamp: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{InboundEmail, OutboundReply};

    #[test]
    fn reply_targets_sender_with_prefixed_subject() {
        let email = InboundEmail::new("john@x.com", "Where is my order?", "Hi there");
        let reply = OutboundReply::reply_to(&email, "On its way", Utc::now());

        assert_eq!(reply.to_email, "john@x.com");
        assert_eq!(reply.subject, "Re: Where is my order?");
        assert_eq!(reply.body, "On its way");
    }

    #[test]
    fn render_includes_headers_and_body() {
        let email = InboundEmail::new("john@x.com", "Status", "Order ORD-1?");
        let rendered = email.render();

        assert!(rendered.starts_with("From: john@x.com\nSubject: Status"));
        assert!(rendered.ends_with("Order ORD-1?"));
    }
}
