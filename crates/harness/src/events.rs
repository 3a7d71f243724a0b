//! Event Sink (spec.md §4.5): a write-only sink for the totally ordered
//! runtime event stream. `seq` is assigned synchronously by the
//! Orchestrator at the point of emission, never by the producer.

use async_trait::async_trait;
use rlm_domain::event::{EventKind, RuntimeEvent};

/// Implemented by whatever the operator wants to observe the run with (a
/// websocket relay, a log line, an in-memory `Vec` in tests). The
/// Orchestrator awaits each call in emission order so an external observer
/// sees a strictly ordered stream, but a failing sink never fails the run
/// (spec.md §4.5, §7): errors are swallowed, optionally logged.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: RuntimeEvent);
}

/// No-op sink used when the operator doesn't configure one.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: RuntimeEvent) {}
}

/// Collects every event into memory, in emission order. Used by tests and
/// by any caller that wants the full stream after the fact rather than
/// live delivery.
#[derive(Default)]
pub struct VecSink {
    events: parking_lot::Mutex<Vec<RuntimeEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for VecSink {
    async fn emit(&self, event: RuntimeEvent) {
        self.events.lock().push(event);
    }
}

/// A sink backed by a verbose-mode `tracing` log line, wrapping an inner
/// sink (grounded on the teacher's layered middleware approach — log,
/// then delegate).
pub struct LoggingSink<S> {
    inner: S,
    verbose: bool,
}

impl<S: EventSink> LoggingSink<S> {
    pub fn new(inner: S, verbose: bool) -> Self {
        Self { inner, verbose }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for LoggingSink<S> {
    async fn emit(&self, event: RuntimeEvent) {
        if self.verbose {
            tracing::debug!(seq = event.seq, kind = event.kind.as_dotted(), summary = %event.summary, "event");
        }
        self.inner.emit(event).await;
    }
}

/// Build the event payload for a `root.iteration.*` event.
pub fn root_iteration_payload(
    iteration: u32,
    code_blocks: Option<usize>,
    response_chars: Option<usize>,
    latency_ms: Option<u64>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({ "iteration": iteration });
    if let Some(v) = code_blocks {
        payload["codeBlocks"] = serde_json::json!(v);
    }
    if let Some(v) = response_chars {
        payload["responseChars"] = serde_json::json!(v);
    }
    if let Some(v) = latency_ms {
        payload["latencyMs"] = serde_json::json!(v);
    }
    payload
}

/// Build the event payload for a `repl.execution.*` event.
pub fn repl_execution_payload(
    repl_execution_id: &str,
    iteration: u32,
    extra: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "replExecutionId": repl_execution_id,
        "iteration": iteration,
    });
    if let Some(extra) = extra {
        if let (Some(obj), Some(extra_obj)) = (payload.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    payload
}

/// Build the event payload for a `subcall.*` event.
pub fn subcall_payload(
    subcall_id: &str,
    iteration_index: Option<u32>,
    repl_execution_id: Option<&str>,
    model: &str,
    extra: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "subcallId": subcall_id,
        "iterationIndex": iteration_index,
        "replExecutionId": repl_execution_id,
        "model": model,
    });
    if let Some(extra) = extra {
        if let (Some(obj), Some(extra_obj)) = (payload.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    payload
}

pub fn kind_summary(kind: EventKind, detail: impl Into<String>) -> String {
    format!("{}: {}", kind.as_dotted(), detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_sink_preserves_emission_order() {
        let sink = VecSink::new();
        for seq in 1..=5u64 {
            sink.emit(RuntimeEvent::new(0, seq, EventKind::RunStarted, "x", None))
                .await;
        }
        let events = sink.events();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        let sink = NullSink;
        sink.emit(RuntimeEvent::new(0, 1, EventKind::RunStarted, "x", None))
            .await;
    }

    #[test]
    fn subcall_payload_includes_nullable_bindings() {
        let payload = subcall_payload("sub-1", None, None, "gpt-4o", None);
        assert_eq!(payload["iterationIndex"], serde_json::json!(null));
        assert_eq!(payload["replExecutionId"], serde_json::json!(null));
    }
}
