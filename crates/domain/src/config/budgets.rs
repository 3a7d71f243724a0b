use serde::{Deserialize, Serialize};

/// `[budgets]` config section — resolved defaults from spec.md §4.8.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetsConfig {
    #[serde(default = "d_iteration_limit")]
    pub iteration_limit: u32,
    #[serde(default = "d_subcall_limit")]
    pub subcall_limit: u32,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "d_max_execution_output_chars")]
    pub max_execution_output_chars: usize,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            iteration_limit: d_iteration_limit(),
            subcall_limit: d_subcall_limit(),
            request_timeout_ms: d_request_timeout_ms(),
            max_execution_output_chars: d_max_execution_output_chars(),
        }
    }
}

fn d_iteration_limit() -> u32 {
    16
}
fn d_subcall_limit() -> u32 {
    200
}
fn d_request_timeout_ms() -> u64 {
    120_000
}
fn d_max_execution_output_chars() -> usize {
    20_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_resolved_defaults() {
        let budgets = BudgetsConfig::default();
        assert_eq!(budgets.iteration_limit, 16);
        assert_eq!(budgets.subcall_limit, 200);
        assert_eq!(budgets.request_timeout_ms, 120_000);
        assert_eq!(budgets.max_execution_output_chars, 20_000);
    }
}
