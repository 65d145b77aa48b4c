use serde::{Deserialize, Serialize};

use crate::domain::case::CannedReason;
use crate::domain::classification::QueryLabel;
use crate::domain::validation::Recommendation;

pub const DEFAULT_ROUND_LIMIT: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteState {
    Classify,
    Respond,
    ExecuteTools,
    PostProcess,
    Validate,
    Dispatch,
    Escalate,
    CannedReply,
}

impl RouteState {
    pub const ALL: [RouteState; 8] = [
        RouteState::Classify,
        RouteState::Respond,
        RouteState::ExecuteTools,
        RouteState::PostProcess,
        RouteState::Validate,
        RouteState::Dispatch,
        RouteState::Escalate,
        RouteState::CannedReply,
    ];

    /// Name written into trace records and graph renderings.
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Respond => "respond",
            Self::ExecuteTools => "execute_tools",
            Self::PostProcess => "post_process",
            Self::Validate => "validate",
            Self::Dispatch => "dispatch",
            Self::Escalate => "escalate",
            Self::CannedReply => "canned_reply",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatch | Self::Escalate | Self::CannedReply)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteEvent {
    Classified(QueryLabel),
    ClassifierFailed,
    ToolCallsRequested { rounds_completed: u32 },
    DraftReturned,
    ResponderFailed,
    ToolsExecuted,
    ToolExecutionFailed,
    IdentityResolved,
    IdentityMissing,
    /// The round limit was reached with no final draft while the latest tool
    /// round was still being refused on ownership or identity grounds.
    AuthorizationExhausted,
    Validated { passed: bool, recommendation: Recommendation },
    ValidatorFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub round_limit: u32,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self { round_limit: DEFAULT_ROUND_LIMIT }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    InvokeResponder,
    ExecuteToolCalls,
    ExtractDraft,
    ValidateDraft,
    DispatchReply,
    QueueEscalation,
    SendAcknowledgment,
    SendCannedReply(CannedReason),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RouteState,
    pub to: RouteState,
    pub event: RouteEvent,
    pub actions: Vec<FlowAction>,
}
