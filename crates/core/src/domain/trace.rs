use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summaries longer than this are truncated on append.
pub const SUMMARY_LIMIT: usize = 200;

/// One executed step of a case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    #[serde(rename = "node")]
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub input_summary: String,
    pub output_summary: String,
    pub duration_ms: u64,
}

impl TraceRecord {
    pub fn new(
        step: impl Into<String>,
        timestamp: DateTime<Utc>,
        input_summary: impl Into<String>,
        output_summary: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step: step.into(),
            timestamp,
            input_summary: input_summary.into(),
            output_summary: output_summary.into(),
            duration_ms,
        }
    }
}

/// Append-only, execution-ordered step log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    /// Appends a record. A timestamp earlier than the previous record (clock
    /// skew) is raised to it so the sequence stays non-decreasing.
    pub fn append(&mut self, mut record: TraceRecord) {
        if let Some(last) = self.records.last() {
            if record.timestamp < last.timestamp {
                record.timestamp = last.timestamp;
            }
        }
        record.input_summary = truncate(&record.input_summary);
        record.output_summary = truncate(&record.output_summary);
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TraceRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn steps(&self) -> Vec<&str> {
        self.records.iter().map(|record| record.step.as_str()).collect()
    }
}

fn truncate(summary: &str) -> String {
    if summary.chars().count() <= SUMMARY_LIMIT {
        return summary.to_owned();
    }
    let mut cut: String = summary.chars().take(SUMMARY_LIMIT).collect();
    cut.push_str("...");
    cut
}
