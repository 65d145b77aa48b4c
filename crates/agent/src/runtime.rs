use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use parceldesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use parceldesk_core::config::{AppConfig, OrchestratorConfig};
use parceldesk_core::domain::case::{CannedReason, Case, CaseDelta, Outcome};
use parceldesk_core::domain::conversation::{check_tool_calls, ToolCall, Turn};
use parceldesk_core::domain::email::{InboundEmail, OutboundReply};
use parceldesk_core::domain::escalation::EscalationItem;
use parceldesk_core::domain::trace::TraceRecord;
use parceldesk_core::errors::{DomainError, StepError};
use parceldesk_core::flows::{
    FlowAction, FlowContext, FlowEngine, RouteEvent, RouteState, SupportFlow, DEFAULT_ROUND_LIMIT,
};
use parceldesk_db::RecordStore;

use crate::classifier::{Classifier, LlmClassifier};
use crate::llm::LlmError;
use crate::prompts::{PromptBook, FALLBACK_DRAFT};
use crate::providers;
use crate::responder::{LlmResponder, Responder};
use crate::tools::ToolExecutor;
use crate::validator::{LlmValidator, ReplyValidator};

const DEFAULT_ESCALATION_REASON: &str = "requires human review";
const AUTHORIZATION_EXHAUSTED: &str =
    "authorization error: tool calls were still refused when the round limit was reached";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub round_limit: u32,
    pub step_timeout: Duration,
    pub order_lookback_days: u32,
}

impl RuntimeSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            round_limit: config.round_limit,
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            order_lookback_days: config.order_lookback_days,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            round_limit: DEFAULT_ROUND_LIMIT,
            step_timeout: Duration::from_secs(60),
            order_lookback_days: 14,
        }
    }
}

/// Drives cases through the routing graph. One `process` call owns its case
/// from ingress to terminal action; concurrent calls share only the store.
pub struct AgentRuntime {
    classifier: Arc<dyn Classifier>,
    responder: Arc<dyn Responder>,
    validator: Arc<dyn ReplyValidator>,
    tools: ToolExecutor,
    store: RecordStore,
    prompts: Arc<PromptBook>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<SupportFlow>,
    settings: RuntimeSettings,
}

struct StepRun {
    delta: CaseDelta,
    event: RouteEvent,
    input_summary: String,
    output_summary: String,
}

struct TerminalRun {
    outcome: Outcome,
    delta: CaseDelta,
    input_summary: String,
    output_summary: String,
}

impl AgentRuntime {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        responder: Arc<dyn Responder>,
        validator: Arc<dyn ReplyValidator>,
        store: RecordStore,
        prompts: Arc<PromptBook>,
        audit: Arc<dyn AuditSink>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            classifier,
            responder,
            validator,
            tools: ToolExecutor::new(store.clone(), settings.order_lookback_days, audit.clone()),
            store,
            prompts,
            audit,
            engine: FlowEngine::default(),
            settings,
        }
    }

    /// Wires the model-backed classifier, responder and validator from config.
    pub fn from_config(
        config: &AppConfig,
        store: RecordStore,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, LlmError> {
        let client = providers::build_client(&config.llm)?;
        let prompts = Arc::new(PromptBook::from_config(&config.company));
        let llm = &config.llm;

        let classifier = Arc::new(LlmClassifier::new(
            client.clone(),
            llm.guardrail_model.clone(),
            llm.max_tokens,
            prompts.clone(),
            config.orchestrator.classification_fallback,
        ));
        let responder =
            Arc::new(LlmResponder::new(client.clone(), llm.main_model.clone(), llm.max_tokens));
        let validator = Arc::new(LlmValidator::new(
            client,
            llm.guardrail_model.clone(),
            llm.max_tokens,
            prompts.clone(),
            config.orchestrator.validation_fallback,
        ));

        Ok(Self::new(
            classifier,
            responder,
            validator,
            store,
            prompts,
            audit,
            RuntimeSettings::from_config(&config.orchestrator),
        ))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn prompts(&self) -> &PromptBook {
        &self.prompts
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Runs one email to its terminal action. Failures inside steps are
    /// routed, not returned; the case always comes back concluded.
    ///
    /// A running step is never cancelled; a case may only be abandoned
    /// between states.
    pub async fn process(&self, email: InboundEmail) -> Case {
        let mut case = Case::new(email, Utc::now());
        let audit = AuditContext::new(Some(case.id.clone()), case.id.as_str(), "agent_runtime");
        let context = FlowContext { round_limit: self.settings.round_limit };
        info!(
            event_name = "case.received",
            correlation_id = case.id.as_str(),
            sender = %case.email.sender_email,
            "processing inbound email"
        );
        self.audit.emit(
            AuditEvent::from_context(&audit, "case.received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("sender", case.email.sender_email.clone()),
        );

        let mut state = self.engine.initial_state();
        let mut actions = Vec::new();
        loop {
            let started_at = Utc::now();
            let clock = Instant::now();
            let run = match state {
                RouteState::Classify => self.classify(&case).await,
                RouteState::Respond => self.respond(&case).await,
                RouteState::ExecuteTools => self.execute_tools(&case).await,
                RouteState::PostProcess => self.post_process(&case),
                RouteState::Validate => self.validate(&case).await,
                RouteState::Dispatch | RouteState::Escalate | RouteState::CannedReply => break,
            };

            let duration_ms = elapsed_ms(clock);
            case.record(TraceRecord::new(
                state.step_name(),
                started_at,
                run.input_summary,
                run.output_summary,
                duration_ms,
            ));
            debug!(
                event_name = "case.step_completed",
                correlation_id = case.id.as_str(),
                step = state.step_name(),
                duration_ms,
                "routing step finished"
            );

            let event = match case.apply(run.delta) {
                Ok(()) => run.event,
                Err(error) => reject_delta(&mut case, state, &error),
            };

            match self.engine.apply_with_audit(
                &state,
                &event,
                &context,
                self.audit.as_ref(),
                &audit,
            ) {
                Ok(transition) => {
                    state = transition.to;
                    actions = transition.actions;
                }
                Err(error) => {
                    error!(
                        event_name = "case.transition_rejected",
                        correlation_id = case.id.as_str(),
                        error = %error,
                        "routing transition rejected; escalating"
                    );
                    merge_or_log(
                        &mut case,
                        CaseDelta {
                            escalation_reason: Some(format!("routing error: {error}")),
                            error: Some(error.to_string()),
                            ..CaseDelta::default()
                        },
                    );
                    state = RouteState::Escalate;
                    actions = vec![FlowAction::QueueEscalation, FlowAction::SendAcknowledgment];
                }
            }
        }

        self.finish(&mut case, state, &actions, &audit).await;
        case
    }

    async fn finish(
        &self,
        case: &mut Case,
        state: RouteState,
        actions: &[FlowAction],
        audit: &AuditContext,
    ) {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run = match state {
            RouteState::Dispatch => self.dispatch(case).await,
            RouteState::CannedReply => {
                let reason = actions.iter().find_map(|action| match action {
                    FlowAction::SendCannedReply(reason) => Some(*reason),
                    _ => None,
                });
                let reason = match reason {
                    Some(reason) => reason,
                    None => {
                        error!(
                            event_name = "case.canned_reason_missing",
                            correlation_id = case.id.as_str(),
                            "canned reply reached without a reason; sending the technical error reply"
                        );
                        CannedReason::TechnicalError
                    }
                };
                self.send_canned(case, reason).await
            }
            _ => self.escalate(case).await,
        };

        if let Some(error) = &run.delta.error {
            error!(
                event_name = "case.terminal_store_failed",
                correlation_id = case.id.as_str(),
                step = state.step_name(),
                error = %error,
                "terminal action could not be recorded"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    audit,
                    "case.terminal_store_failed",
                    AuditCategory::Persistence,
                    AuditOutcome::Failed,
                )
                .with_metadata("step", state.step_name())
                .with_metadata("error", error.clone()),
            );
        }

        case.record(TraceRecord::new(
            state.step_name(),
            started_at,
            run.input_summary,
            run.output_summary,
            elapsed_ms(clock),
        ));
        merge_or_log(case, run.delta);
        if let Err(error) = case.conclude(run.outcome) {
            error!(
                event_name = "case.conclude_failed",
                correlation_id = case.id.as_str(),
                error = %error,
                "case outcome could not be recorded"
            );
        }

        info!(
            event_name = "case.concluded",
            correlation_id = case.id.as_str(),
            routed_to = case.routed_to().as_str(),
            steps = case.trace.len(),
            "case concluded"
        );
    }

    async fn bounded<T>(
        &self,
        future: impl Future<Output = Result<T, StepError>>,
        on_timeout: fn(String) -> StepError,
    ) -> Result<T, StepError> {
        match tokio::time::timeout(self.settings.step_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "timed out after {}s",
                self.settings.step_timeout.as_secs()
            ))),
        }
    }

    async fn classify(&self, case: &Case) -> StepRun {
        let input_summary = format!("Email from {}: {}", case.email.sender_email, case.email.subject);
        match self.bounded(self.classifier.classify(&case.email), StepError::Classification).await {
            Ok(result) => StepRun {
                event: RouteEvent::Classified(result.label),
                output_summary: format!(
                    "Classified as: {} (confidence: {:.2})",
                    result.label.as_str(),
                    result.confidence
                ),
                delta: CaseDelta { classification: Some(result), ..CaseDelta::default() },
                input_summary,
            },
            Err(error) => failed(case, input_summary, RouteEvent::ClassifierFailed, &error),
        }
    }

    async fn respond(&self, case: &Case) -> StepRun {
        let mut new_turns = Vec::new();
        if case.conversation.is_empty() {
            new_turns.push(Turn::System { content: self.prompts.responder_system() });
            new_turns.push(Turn::User { content: self.prompts.responder_user(&case.email) });
        }
        let mut turns = case.conversation.turns().to_vec();
        turns.extend(new_turns.iter().cloned());

        let input_summary = format!("LLM call (messages: {})", turns.len());
        match self.bounded(self.responder.respond(&turns), StepError::Responder).await {
            Ok(output) => {
                if let Err(message) = check_tool_calls(&output.tool_calls) {
                    let error = StepError::Responder(message);
                    return failed(case, input_summary, RouteEvent::ResponderFailed, &error);
                }
                let requested = output.tool_calls.len();
                let event = if requested > 0 {
                    RouteEvent::ToolCallsRequested { rounds_completed: case.rounds_completed }
                } else {
                    RouteEvent::DraftReturned
                };
                new_turns.push(output.into_turn());
                StepRun {
                    delta: CaseDelta { turns: new_turns, ..CaseDelta::default() },
                    event,
                    input_summary,
                    output_summary: format!("Tool calls: {requested}"),
                }
            }
            Err(error) => failed(case, input_summary, RouteEvent::ResponderFailed, &error),
        }
    }

    async fn execute_tools(&self, case: &Case) -> StepRun {
        let calls = pending_calls(case);
        let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
        let input_summary = format!("Tools called: {}", names.join(", "));

        match self.tools.execute_round(case, &calls, Utc::now()).await {
            Ok(round) => {
                let user = if round.identity.is_some() || case.identity.is_some() {
                    "found"
                } else {
                    "not found"
                };
                let output_summary = format!("User: {user}, Orders: {}", round.orders.len());
                StepRun {
                    delta: round.into_delta(),
                    event: RouteEvent::ToolsExecuted,
                    input_summary,
                    output_summary,
                }
            }
            Err(error) => failed(case, input_summary, RouteEvent::ToolExecutionFailed, &error),
        }
    }

    fn post_process(&self, case: &Case) -> StepRun {
        let draft = case.conversation.last_assistant_text().unwrap_or(FALLBACK_DRAFT).to_string();
        let mut escalation_reason = None;
        let (event, user, route) = match &case.identity {
            None => (RouteEvent::IdentityMissing, "Not found", "canned_reply"),
            Some(identity) if self.authorization_exhausted(case) => {
                warn!(
                    event_name = "case.authorization_exhausted",
                    correlation_id = case.id.as_str(),
                    rounds = case.rounds_completed,
                    "tool calls still refused at the round limit; escalating"
                );
                escalation_reason = Some(AUTHORIZATION_EXHAUSTED.to_string());
                (RouteEvent::AuthorizationExhausted, identity.name.as_str(), "escalate")
            }
            Some(identity) => (RouteEvent::IdentityResolved, identity.name.as_str(), "validate"),
        };
        StepRun {
            output_summary: format!("User: {user}, Orders: {}, Route: {route}", case.orders.len()),
            input_summary: format!("Order status query from {}", case.email.sender_email),
            delta: CaseDelta { draft: Some(draft), escalation_reason, ..CaseDelta::default() },
            event,
        }
    }

    /// The round limit cut the loop off with no final draft while the last
    /// tool round was still being refused.
    fn authorization_exhausted(&self, case: &Case) -> bool {
        case.rounds_completed >= self.settings.round_limit
            && case.conversation.final_draft().is_none()
            && case.conversation.latest_results_denied()
    }

    async fn validate(&self, case: &Case) -> StepRun {
        let length = case.draft.as_deref().map_or(0, |draft| draft.chars().count());
        let input_summary = format!("Validating response ({length} chars)");
        match self.bounded(self.validator.validate(case), StepError::Validation).await {
            Ok(validation) => {
                let escalation_reason =
                    (!validation.permits_dispatch()).then(|| validation.escalation_reason());
                StepRun {
                    event: RouteEvent::Validated {
                        passed: validation.passed,
                        recommendation: validation.recommendation,
                    },
                    output_summary: format!(
                        "Passed: {}, Recommendation: {}",
                        validation.passed,
                        validation.recommendation.as_str()
                    ),
                    delta: CaseDelta {
                        validation: Some(validation),
                        escalation_reason,
                        ..CaseDelta::default()
                    },
                    input_summary,
                }
            }
            Err(error) => failed(case, input_summary, RouteEvent::ValidatorFailed, &error),
        }
    }

    async fn dispatch(&self, case: &Case) -> TerminalRun {
        let draft = case.draft.clone().unwrap_or_else(|| FALLBACK_DRAFT.to_string());
        let reply = OutboundReply::reply_to(&case.email, draft, Utc::now());
        let error = self
            .store
            .sent_replies
            .append(reply.clone())
            .await
            .err()
            .map(|error| format!("failed to record sent reply: {error}"));

        TerminalRun {
            outcome: Outcome::Dispatched { reply: reply.clone() },
            input_summary: format!("Sending response to {}", case.email.sender_email),
            output_summary: error
                .as_ref()
                .map_or_else(|| "Email sent successfully".to_string(), |e| format!("Error: {e}")),
            delta: CaseDelta { final_reply: Some(reply), error, ..CaseDelta::default() },
        }
    }

    async fn escalate(&self, case: &Case) -> TerminalRun {
        let now = Utc::now();
        let reason = case
            .escalation_reason
            .clone()
            .unwrap_or_else(|| DEFAULT_ESCALATION_REASON.to_string());
        let item = EscalationItem::open(case.email.clone(), reason.clone(), now);
        let escalation_id = item.id.clone();

        let mut errors = Vec::new();
        if let Err(error) = self.store.escalations.append(item).await {
            errors.push(format!("failed to queue escalation: {error}"));
        }
        let acknowledgment =
            OutboundReply::reply_to(&case.email, self.prompts.escalation_acknowledgment(), now);
        if let Err(error) = self.store.sent_replies.append(acknowledgment.clone()).await {
            errors.push(format!("failed to record acknowledgment: {error}"));
        }

        let short_id: String = escalation_id.as_str().chars().take(8).collect();
        let error = (!errors.is_empty()).then(|| errors.join("; "));
        TerminalRun {
            outcome: Outcome::Escalated { escalation_id, reason: reason.clone() },
            input_summary: format!("Escalating case from {}", case.email.sender_email),
            output_summary: match &error {
                Some(error) => format!("Error: {error}"),
                None => format!("Added to queue (ID: {short_id}...), sent acknowledgment"),
            },
            delta: CaseDelta {
                escalation_reason: case.escalation_reason.is_none().then_some(reason),
                final_reply: Some(acknowledgment),
                error,
                ..CaseDelta::default()
            },
        }
    }

    async fn send_canned(&self, case: &Case, reason: CannedReason) -> TerminalRun {
        let reply = OutboundReply::reply_to(&case.email, self.prompts.canned_reply(reason), Utc::now());
        let error = self
            .store
            .sent_replies
            .append(reply.clone())
            .await
            .err()
            .map(|error| format!("failed to record canned reply: {error}"));

        TerminalRun {
            outcome: Outcome::CannedReply { reason },
            input_summary: format!(
                "Sending default response ({}) to {}",
                reason.as_str(),
                case.email.sender_email
            ),
            output_summary: error
                .as_ref()
                .map_or_else(|| "Default response sent".to_string(), |e| format!("Error: {e}")),
            delta: CaseDelta { final_reply: Some(reply), error, ..CaseDelta::default() },
        }
    }
}

fn failed(case: &Case, input_summary: String, event: RouteEvent, error: &StepError) -> StepRun {
    warn!(
        event_name = "case.step_failed",
        correlation_id = case.id.as_str(),
        error = %error,
        "routing step failed; escalating"
    );
    StepRun {
        delta: CaseDelta {
            escalation_reason: Some(error.escalation_reason()),
            error: Some(error.to_string()),
            ..CaseDelta::default()
        },
        event,
        input_summary,
        output_summary: format!("Error: {error}"),
    }
}

/// A step produced a delta the case refused. The step counts as failed.
fn reject_delta(case: &mut Case, state: RouteState, error: &DomainError) -> RouteEvent {
    let message = error.to_string();
    let (event, step_error) = match state {
        RouteState::Classify => (RouteEvent::ClassifierFailed, StepError::Classification(message)),
        RouteState::Respond => (RouteEvent::ResponderFailed, StepError::Responder(message)),
        RouteState::Validate => (RouteEvent::ValidatorFailed, StepError::Validation(message)),
        _ => (RouteEvent::ToolExecutionFailed, StepError::Store(message)),
    };
    error!(
        event_name = "case.delta_rejected",
        correlation_id = case.id.as_str(),
        step = state.step_name(),
        error = %error,
        "step result violated a case invariant"
    );

    if state == RouteState::PostProcess {
        merge_or_log(case, CaseDelta { error: Some(step_error.to_string()), ..CaseDelta::default() });
        return RouteEvent::IdentityMissing;
    }
    merge_or_log(
        case,
        CaseDelta {
            escalation_reason: Some(step_error.escalation_reason()),
            error: Some(step_error.to_string()),
            ..CaseDelta::default()
        },
    );
    event
}

fn merge_or_log(case: &mut Case, delta: CaseDelta) {
    if let Err(error) = case.apply(delta) {
        error!(
            event_name = "case.merge_failed",
            correlation_id = case.id.as_str(),
            error = %error,
            "case delta could not be merged"
        );
    }
}

/// Calls from the latest responder turn that still await a result.
fn pending_calls(case: &Case) -> Vec<ToolCall> {
    let unanswered = case.conversation.unanswered_calls();
    case.conversation
        .turns()
        .iter()
        .rev()
        .find_map(|turn| match turn {
            Turn::Assistant { tool_calls, .. } => Some(tool_calls),
            _ => None,
        })
        .map(|calls| calls.iter().filter(|call| unanswered.contains(&call.id)).cloned().collect())
        .unwrap_or_default()
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}
