use parceldesk_core::domain::case::Case;
use parceldesk_core::domain::customer::Customer;
use parceldesk_core::domain::order::OrderRecord;

use crate::tools::ToolRequest;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolDecision {
    Allow,
    Deny { reason_code: &'static str, message: String },
}

impl ToolDecision {
    fn deny(reason_code: &'static str, message: impl Into<String>) -> Self {
        Self::Deny { reason_code, message: message.into() }
    }
}

/// Decides which records a case's tool calls may reach. The only identity a
/// case can acquire is the account registered to its own sender address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPolicy {
    sender_email: String,
    identity: Option<Customer>,
}

impl ToolPolicy {
    pub fn new(sender_email: impl Into<String>, identity: Option<Customer>) -> Self {
        Self { sender_email: sender_email.into(), identity }
    }

    pub fn for_case(case: &Case) -> Self {
        Self::new(case.email.sender_email.clone(), case.identity.clone())
    }

    pub fn identity(&self) -> Option<&Customer> {
        self.identity.as_ref()
    }

    /// Checked before the store is consulted.
    pub fn evaluate(&self, request: &ToolRequest) -> ToolDecision {
        match request {
            ToolRequest::LookupUser { email } => {
                if email.trim().eq_ignore_ascii_case(self.sender_email.trim()) {
                    ToolDecision::Allow
                } else {
                    ToolDecision::deny(
                        "sender_mismatch",
                        "Security validation failed: Can only look up the email sender's account",
                    )
                }
            }
            ToolRequest::OrdersForUser { user_id, .. } => match &self.identity {
                None => ToolDecision::deny(
                    "identity_unresolved",
                    "Must look up user first before fetching orders",
                ),
                Some(identity) if identity.id.as_str() != user_id => ToolDecision::deny(
                    "user_mismatch",
                    "Security validation failed: Can only fetch orders for the verified user",
                ),
                Some(_) => ToolDecision::Allow,
            },
            ToolRequest::OrderById { .. } => ToolDecision::Allow,
        }
    }

    /// Checked after an order has been fetched by id.
    pub fn screen_order(&self, order: &OrderRecord) -> ToolDecision {
        match &self.identity {
            None => ToolDecision::deny(
                "identity_unresolved",
                "Must look up user first before fetching orders",
            ),
            Some(identity) if !order.is_owned_by(&identity.id) => ToolDecision::deny(
                "order_not_owned",
                "Security validation failed: Order does not belong to this user",
            ),
            Some(_) => ToolDecision::Allow,
        }
    }

    /// Accepts a looked-up customer as the case identity. Only the sender's
    /// own record qualifies, and an identity never changes once set.
    pub fn admit_identity(&mut self, customer: &Customer) -> ToolDecision {
        if !customer.owns_address(&self.sender_email) {
            return ToolDecision::deny(
                "sender_mismatch",
                "Security validation failed: Can only look up the email sender's account",
            );
        }
        match &self.identity {
            Some(existing) if existing.id != customer.id => ToolDecision::deny(
                "identity_conflict",
                "Security validation failed: A different account is already verified",
            ),
            Some(_) => ToolDecision::Allow,
            None => {
                self.identity = Some(customer.clone());
                ToolDecision::Allow
            }
        }
    }
}
