use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::case::CannedReason;
use crate::domain::classification::QueryLabel;
use crate::domain::validation::Recommendation;
use crate::flows::states::{FlowAction, FlowContext, RouteEvent, RouteState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> RouteState;
    fn transition(
        &self,
        current: &RouteState,
        event: &RouteEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The support-email routing graph.
#[derive(Clone, Debug, Default)]
pub struct SupportFlow;

impl FlowDefinition for SupportFlow {
    fn initial_state(&self) -> RouteState {
        RouteState::Classify
    }

    fn transition(
        &self,
        current: &RouteState,
        event: &RouteEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_support(current, event, context)
    }
}

impl SupportFlow {
    /// Static edge list `(from, condition, to)` of the routing graph.
    pub fn edges() -> Vec<(RouteState, &'static str, RouteState)> {
        use RouteState::{
            CannedReply, Classify, Dispatch, Escalate, ExecuteTools, PostProcess, Respond,
            Validate,
        };
        vec![
            (Classify, "order_status", Respond),
            (Classify, "other / error", Escalate),
            (Classify, "prompt_injection / out_of_scope", CannedReply),
            (Respond, "tool calls, under round limit", ExecuteTools),
            (ExecuteTools, "results appended", Respond),
            (ExecuteTools, "store error", Escalate),
            (Respond, "final draft / round limit", PostProcess),
            (Respond, "error", Escalate),
            (PostProcess, "identity resolved", Validate),
            (PostProcess, "no identity", CannedReply),
            (PostProcess, "denied past round limit", Escalate),
            (Validate, "pass + send", Dispatch),
            (Validate, "otherwise", Escalate),
        ]
    }

    /// Mermaid flowchart of [`SupportFlow::edges`].
    pub fn render_mermaid() -> String {
        let mut out = String::from("graph TD\n    __start__([start]) --> classify\n");
        for (from, label, to) in Self::edges() {
            out.push_str(&format!(
                "    {} -->|{}| {}\n",
                from.step_name(),
                label,
                to.step_name()
            ));
        }
        for state in RouteState::ALL.iter().filter(|state| state.is_terminal()) {
            out.push_str(&format!("    {} --> __end__([end])\n", state.step_name()));
        }
        out
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> RouteState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &RouteState,
        event: &RouteEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &RouteState,
        event: &RouteEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Routing,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.step_name())
                    .with_metadata("to", outcome.to.step_name())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Routing,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SupportFlow> {
    fn default() -> Self {
        Self::new(SupportFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("state {state:?} is terminal")]
    Terminal { state: RouteState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RouteState, event: RouteEvent },
}

fn transition_support(
    current: &RouteState,
    event: &RouteEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        DispatchReply, ExecuteToolCalls, ExtractDraft, InvokeResponder, QueueEscalation,
        SendAcknowledgment, SendCannedReply, ValidateDraft,
    };
    use RouteEvent::{
        AuthorizationExhausted, ClassifierFailed, Classified, DraftReturned, IdentityMissing,
        IdentityResolved, ResponderFailed, ToolCallsRequested, ToolExecutionFailed,
        ToolsExecuted, Validated, ValidatorFailed,
    };
    use RouteState::{
        CannedReply, Classify, Dispatch, Escalate, ExecuteTools, PostProcess, Respond, Validate,
    };

    if current.is_terminal() {
        return Err(FlowTransitionError::Terminal { state: *current });
    }

    let escalate = || (Escalate, vec![QueueEscalation, SendAcknowledgment]);

    let (to, actions) = match (current, event) {
        (Classify, Classified(QueryLabel::OrderStatus)) => (Respond, vec![InvokeResponder]),
        (Classify, Classified(QueryLabel::Other)) => escalate(),
        (Classify, Classified(label)) => match CannedReason::for_label(*label) {
            Some(reason) => (CannedReply, vec![SendCannedReply(reason)]),
            None => {
                return Err(FlowTransitionError::InvalidTransition {
                    state: *current,
                    event: event.clone(),
                });
            }
        },
        (Classify, ClassifierFailed) => escalate(),
        (Respond, ToolCallsRequested { rounds_completed }) => {
            if *rounds_completed < context.round_limit {
                (ExecuteTools, vec![ExecuteToolCalls])
            } else {
                (PostProcess, vec![ExtractDraft])
            }
        }
        (Respond, DraftReturned) => (PostProcess, vec![ExtractDraft]),
        (Respond, ResponderFailed) => escalate(),
        (ExecuteTools, ToolsExecuted) => (Respond, vec![InvokeResponder]),
        (ExecuteTools, ToolExecutionFailed) => escalate(),
        (PostProcess, IdentityResolved) => (Validate, vec![ValidateDraft]),
        (PostProcess, IdentityMissing) => {
            (CannedReply, vec![SendCannedReply(CannedReason::UserNotFound)])
        }
        (PostProcess, AuthorizationExhausted) => escalate(),
        (Validate, Validated { passed: true, recommendation: Recommendation::Send }) => {
            (Dispatch, vec![DispatchReply])
        }
        (Validate, Validated { .. }) | (Validate, ValidatorFailed) => escalate(),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
