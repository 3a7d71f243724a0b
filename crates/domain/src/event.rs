use serde::{Deserialize, Serialize};

/// Closed vocabulary of runtime event kinds (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStarted,
    RunInitialized,
    RunFinalized,
    RunFailed,
    RunEndedCompleted,
    RunEndedFailed,
    RootIterationStarted,
    RootIterationCompleted,
    ReplExecutionStarted,
    ReplExecutionCompleted,
    SubcallStarted,
    SubcallCompleted,
    SubcallFailed,
    SubcallRejected,
    SubcallBatchStarted,
    SubcallBatchCompleted,
}

impl EventKind {
    /// The dotted-string wire representation, e.g. `"root.iteration.started"`.
    pub fn as_dotted(self) -> &'static str {
        match self {
            EventKind::RunStarted => "run.started",
            EventKind::RunInitialized => "run.initialized",
            EventKind::RunFinalized => "run.finalized",
            EventKind::RunFailed => "run.failed",
            EventKind::RunEndedCompleted => "run.ended_completed",
            EventKind::RunEndedFailed => "run.ended_failed",
            EventKind::RootIterationStarted => "root.iteration.started",
            EventKind::RootIterationCompleted => "root.iteration.completed",
            EventKind::ReplExecutionStarted => "repl.execution.started",
            EventKind::ReplExecutionCompleted => "repl.execution.completed",
            EventKind::SubcallStarted => "subcall.started",
            EventKind::SubcallCompleted => "subcall.completed",
            EventKind::SubcallFailed => "subcall.failed",
            EventKind::SubcallRejected => "subcall.rejected",
            EventKind::SubcallBatchStarted => "subcall.batch_started",
            EventKind::SubcallBatchCompleted => "subcall.batch_completed",
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_dotted())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EventKind::from_dotted(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown event kind: {s}")))
    }
}

impl EventKind {
    fn from_dotted(s: &str) -> Option<Self> {
        Some(match s {
            "run.started" => EventKind::RunStarted,
            "run.initialized" => EventKind::RunInitialized,
            "run.finalized" => EventKind::RunFinalized,
            "run.failed" => EventKind::RunFailed,
            "run.ended_completed" => EventKind::RunEndedCompleted,
            "run.ended_failed" => EventKind::RunEndedFailed,
            "root.iteration.started" => EventKind::RootIterationStarted,
            "root.iteration.completed" => EventKind::RootIterationCompleted,
            "repl.execution.started" => EventKind::ReplExecutionStarted,
            "repl.execution.completed" => EventKind::ReplExecutionCompleted,
            "subcall.started" => EventKind::SubcallStarted,
            "subcall.completed" => EventKind::SubcallCompleted,
            "subcall.failed" => EventKind::SubcallFailed,
            "subcall.rejected" => EventKind::SubcallRejected,
            "subcall.batch_started" => EventKind::SubcallBatchStarted,
            "subcall.batch_completed" => EventKind::SubcallBatchCompleted,
            _ => return None,
        })
    }
}

/// `{ts, seq, kind, summary, payload?}` — spec.md §3/§6.3.
///
/// `seq` is assigned synchronously by the orchestrator at the point of
/// emission; it is never set by the event's producer ahead of time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub ts: i64,
    pub seq: u64,
    pub kind: EventKind,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Cap on serialized payload size. Larger payloads are replaced by a
/// `{truncated, originalLength, preview}` stand-in (spec.md §3).
pub const MAX_EVENT_PAYLOAD_CHARS: usize = 4_000;

impl RuntimeEvent {
    pub fn new(
        ts: i64,
        seq: u64,
        kind: EventKind,
        summary: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        let payload = payload.map(|p| bound_payload(p));
        Self {
            ts,
            seq,
            kind,
            summary: summary.into(),
            payload,
        }
    }
}

fn bound_payload(payload: serde_json::Value) -> serde_json::Value {
    let serialized = payload.to_string();
    if serialized.chars().count() <= MAX_EVENT_PAYLOAD_CHARS {
        return payload;
    }
    let preview: String = serialized.chars().take(MAX_EVENT_PAYLOAD_CHARS).collect();
    serde_json::json!({
        "truncated": true,
        "originalLength": serialized.chars().count(),
        "preview": preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_json() {
        let json = serde_json::to_string(&EventKind::SubcallBatchStarted).unwrap();
        assert_eq!(json, "\"subcall.batch_started\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::SubcallBatchStarted);
    }

    #[test]
    fn event_kind_dotted_strings() {
        assert_eq!(EventKind::RootIterationStarted.as_dotted(), "root.iteration.started");
        assert_eq!(EventKind::SubcallRejected.as_dotted(), "subcall.rejected");
    }

    #[test]
    fn oversized_payload_replaced_with_truncation_marker() {
        let huge = serde_json::json!({"data": "x".repeat(10_000)});
        let event = RuntimeEvent::new(0, 1, EventKind::RunStarted, "run started", Some(huge));
        let payload = event.payload.unwrap();
        assert_eq!(payload["truncated"], serde_json::json!(true));
    }

    #[test]
    fn small_payload_passes_through_unchanged() {
        let small = serde_json::json!({"iteration": 1});
        let event = RuntimeEvent::new(0, 1, EventKind::RootIterationStarted, "iter 1", Some(small.clone()));
        assert_eq!(event.payload.unwrap(), small);
    }
}
