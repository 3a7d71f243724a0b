use serde::{Deserialize, Serialize};

/// `[redaction]` config section — policy parameters for the Redactor
/// (spec.md §4.7): `{maxPromptChars, maxContextPreviewChars,
/// maxReplOutputChars, headChars, tailChars}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RedactionPolicy {
    #[serde(default = "d_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "d_max_context_preview_chars")]
    pub max_context_preview_chars: usize,
    #[serde(default = "d_max_repl_output_chars")]
    pub max_repl_output_chars: usize,
    #[serde(default = "d_head_chars")]
    pub head_chars: usize,
    #[serde(default = "d_tail_chars")]
    pub tail_chars: usize,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            max_prompt_chars: d_max_prompt_chars(),
            max_context_preview_chars: d_max_context_preview_chars(),
            max_repl_output_chars: d_max_repl_output_chars(),
            head_chars: d_head_chars(),
            tail_chars: d_tail_chars(),
        }
    }
}

fn d_max_prompt_chars() -> usize {
    4_000
}
fn d_max_context_preview_chars() -> usize {
    2_000
}
fn d_max_repl_output_chars() -> usize {
    4_000
}
fn d_head_chars() -> usize {
    1_000
}
fn d_tail_chars() -> usize {
    500
}
