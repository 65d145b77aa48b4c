use parceldesk_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events into the process log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let case_id = event.case_id.as_ref().map_or("unknown", |id| id.as_str());
        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                case_id,
                category = event.category.as_str(),
                actor = %event.actor,
                metadata = ?event.metadata,
                "audit event"
            ),
            _ => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                case_id,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = %event.actor,
                metadata = ?event.metadata,
                "audit event"
            ),
        }
    }
}
