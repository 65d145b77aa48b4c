use std::sync::Arc;

use parceldesk_agent::AgentRuntime;
use parceldesk_core::{AuditEvent, Case, InboundEmail, InMemoryAuditSink};
use parceldesk_db::RecordStore;
use serde_json::{json, Value};

use crate::commands::{async_runtime, load_config, open_database, CommandResult, Failure};

/// Runs one email through the router against the configured database and
/// model provider. Replies and escalations are persisted as in the server.
pub fn run(from: &str, subject: &str, body: &str) -> CommandResult {
    let config = match load_config("process") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("process") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let email = InboundEmail::new(from.trim(), subject, body);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let audit = InMemoryAuditSink::default();
        let agent = AgentRuntime::from_config(
            &config,
            RecordStore::sql(pool.clone()),
            Arc::new(audit.clone()),
        )
        .map_err(|error| ("llm_setup", error.to_string(), 7u8));

        let processed: Result<(Case, Vec<AuditEvent>), Failure> = match agent {
            Ok(agent) => {
                let case = agent.process(email).await;
                Ok((case, audit.events()))
            }
            Err(failure) => Err(failure),
        };
        pool.close().await;
        processed
    });

    match result {
        Ok((case, events)) => {
            let routed_to = case.routed_to();
            CommandResult::success_with(
                "process",
                format!("email routed to {}", routed_to.as_str()),
                Some(case_payload(&case, &events)),
            )
        }
        Err(failure) => CommandResult::from_failure("process", failure),
    }
}

fn case_payload(case: &Case, events: &[AuditEvent]) -> Value {
    let transitions: Vec<String> = events
        .iter()
        .filter(|event| event.event_type == "flow.transition_applied")
        .filter_map(|event| {
            Some(format!("{} -> {}", event.metadata.get("from")?, event.metadata.get("to")?))
        })
        .collect();

    json!({
        "case_id": case.id.as_str(),
        "routed_to": case.routed_to(),
        "escalation_reason": case.escalation_reason,
        "response_email": case.final_reply,
        "trace": case.trace,
        "error": case.error,
        "transitions": transitions,
    })
}
