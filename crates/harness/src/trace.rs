//! Trace Collector (spec.md §4.6): accumulates the structured post-hoc
//! trace and is notified exactly once, at run end, whether it succeeded
//! or failed.

use async_trait::async_trait;
use rlm_domain::trace::TraceRecord;

#[async_trait]
pub trait TraceCollector: Send + Sync {
    async fn deliver(&self, trace: TraceRecord);
}

pub struct NullCollector;

#[async_trait]
impl TraceCollector for NullCollector {
    async fn deliver(&self, _trace: TraceRecord) {}
}

/// Captures the one delivered trace in memory, for tests and for any
/// caller that just wants the record back after `completion` returns.
#[derive(Default)]
pub struct VecCollector {
    trace: parking_lot::Mutex<Option<TraceRecord>>,
}

impl VecCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taken(&self) -> Option<TraceRecord> {
        self.trace.lock().take()
    }
}

#[async_trait]
impl TraceCollector for VecCollector {
    async fn deliver(&self, trace: TraceRecord) {
        let mut slot = self.trace.lock();
        debug_assert!(slot.is_none(), "trace collector notified more than once");
        *slot = Some(trace);
    }
}

/// Accumulates iteration/subcall/repl records in memory over the course of
/// a run, materialized into a [`TraceRecord`] once at the very end
/// (spec.md §4.6). This is plain builder state, not itself the collector —
/// the Orchestrator owns one per run and hands the finished record to
/// whatever [`TraceCollector`] was configured.
#[derive(Debug, Default)]
pub struct TraceBuilder {
    pub iterations: Vec<rlm_domain::run::IterationRecord>,
    pub subcalls: Vec<rlm_domain::run::SubcallRecord>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_iteration(&mut self, record: rlm_domain::run::IterationRecord) {
        self.iterations.push(record);
    }

    pub fn push_subcall(&mut self, record: rlm_domain::run::SubcallRecord) {
        self.subcalls.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_collector_starts_empty() {
        let collector = VecCollector::new();
        assert!(collector.taken().is_none());
    }

    #[test]
    fn trace_builder_accumulates_subcalls() {
        use rlm_domain::run::{SubcallKind, SubcallOutcome, SubcallRecord};
        let mut builder = TraceBuilder::new();
        builder.push_subcall(SubcallRecord {
            id: "sub-1".into(),
            iteration_index: Some(1),
            repl_execution_id: Some("repl-1".into()),
            kind: SubcallKind::Single,
            batch_index: None,
            model: "gpt-4o".into(),
            prompt: "hi".into(),
            outcome: SubcallOutcome::Completed { response: "hello".into() },
            latency_ms: 10,
        });
        assert_eq!(builder.subcalls.len(), 1);
    }
}
