//! Workflow progress events carried in the `data:` line of each record.

use crate::error::RecordError;
use crate::workflow::sse::data_payload;
use serde::Deserialize;

/// One server-sent progress event, discriminated by its `event` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StepStart {
        step: usize,
        #[serde(default)]
        label: String,
        total: usize,
    },
    StepComplete {
        step: usize,
        #[serde(default)]
        total: Option<usize>,
    },
    Complete {
        filename: String,
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        detail: String,
    },
}

impl WorkflowEvent {
    /// `complete` and `error` end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::Complete { .. } | WorkflowEvent::Error { .. })
    }
}

/// Decode one framed record. `Ok(None)` for records without a `data:` line.
pub fn parse_record(record: &str) -> Result<Option<WorkflowEvent>, RecordError> {
    let Some(payload) = data_payload(record) else {
        return Ok(None);
    };
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| RecordError::Malformed {
            detail: format!("{e} in {payload:.80}"),
        })
}
