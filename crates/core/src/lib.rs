pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use chrono;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::case::{CannedReason, Case, CaseDelta, CaseId, Outcome, RoutedTo};
pub use domain::classification::{ClassificationFallback, ClassificationResult, QueryLabel};
pub use domain::conversation::{ConversationHistory, ToolCall, ToolResult, Turn};
pub use domain::customer::{Customer, CustomerId};
pub use domain::email::{InboundEmail, OutboundReply};
pub use domain::escalation::{EscalationId, EscalationItem};
pub use domain::order::{OrderId, OrderRecord, OrderStatus};
pub use domain::trace::{Trace, TraceRecord};
pub use domain::validation::{Recommendation, ValidationFallback, ValidationResult};
pub use errors::{ApplicationError, DomainError, InterfaceError, StepError};
pub use flows::{
    FlowAction, FlowContext, FlowEngine, FlowTransitionError, RouteEvent, RouteState, SupportFlow,
    TransitionOutcome,
};
