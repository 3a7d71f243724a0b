use serde::{Deserialize, Serialize};

use crate::context::ContextMeta;
use crate::directive::FinalDirective;
use crate::run::{IterationRecord, RunConfig, SubcallRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Structured post-hoc trace delivered exactly once at run end
/// (spec.md §4.6), whether the run succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub run_id: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub status: RunStatus,
    pub error: Option<String>,
    pub config_snapshot: RunConfig,
    pub context_meta: ContextMeta,
    pub iterations: Vec<IterationRecord>,
    pub subcalls: Vec<SubcallRecord>,
    pub finalization: Option<FinalDirective>,
    pub fallback_used: bool,
}
