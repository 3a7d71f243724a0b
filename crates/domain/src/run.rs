use serde::{Deserialize, Serialize};

use crate::config::RedactionPolicy;

/// Fixed configuration a run is started with (spec.md §3, resolved defaults
/// applied). Immutable for the duration of `completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub root_model: String,
    pub sub_model: String,
    pub iteration_limit: u32,
    pub subcall_limit: u32,
    pub request_timeout_ms: u64,
    pub max_execution_output_chars: usize,
    pub redaction: RedactionPolicy,
}

/// Live, per-run counters and active bindings (spec.md §3). Counters only
/// increase; at most one `(active_iteration_index, active_repl_execution_id)`
/// pair is non-null at a time, and only while an `exec` is in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub subcall_count: u32,
    pub subcall_sequence: u32,
    pub repl_sequence: u32,
    pub active_iteration_index: Option<u32>,
    pub active_repl_execution_id: Option<String>,
}

/// One executed REPL block paired with its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlockExecution {
    pub repl_execution_id: String,
    pub code: String,
    pub result: ReplExecutionResult,
}

/// One root-model turn: the response text plus every code block it produced,
/// paired with results, appended once per root call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    pub response_text: String,
    pub executions: Vec<CodeBlockExecution>,
}

/// Result of one `exec` round-trip with the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub locals: Vec<String>,
    pub execution_time_ms: u64,
}

/// Kind of bridge request a subcall originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubcallKind {
    Single,
    Batched,
}

/// Outcome of a single subcall, recorded for the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubcallOutcome {
    Completed { response: String },
    Failed { error: String },
    Rejected { error: String },
}

/// `sub-<N>` record (spec.md §3). Iteration/exec ids are nullable when the
/// subcall arrives with no active binding — see spec.md §9's open question;
/// this is processed, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcallRecord {
    pub id: String,
    pub iteration_index: Option<u32>,
    pub repl_execution_id: Option<String>,
    pub kind: SubcallKind,
    pub batch_index: Option<u32>,
    pub model: String,
    pub prompt: String,
    pub outcome: SubcallOutcome,
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_default_has_null_bindings() {
        let state = RunState::default();
        assert_eq!(state.active_iteration_index, None);
        assert_eq!(state.active_repl_execution_id, None);
        assert_eq!(state.subcall_count, 0);
    }
}
