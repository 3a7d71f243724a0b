//! Message construction (spec.md §4.8 "Message construction"): the fixed
//! system prompt, the assistant context preamble, per-turn user
//! instructions, and the post-execution transcript of a REPL block.

use rlm_domain::context::ContextMeta;
use rlm_domain::run::ReplExecutionResult;

use crate::parser::truncate;

/// Fixed system prompt declaring the four helper callables injected into
/// the interpreter namespace and mandating a terminating directive.
pub fn system_prompt() -> String {
    "You are the root reasoning model of a recursive language model harness. \
You have a stateful Python REPL available: emit a fenced ```repl code block \
and its contents will be executed with persistent globals across turns. \
The REPL namespace exposes four callables:\n\
  - llm_query(prompt, model=None) -> str\n\
  - llm_query_batched(prompts, model=None) -> list[str]\n\
  - FINAL_VAR(name) -> marks a variable as the final answer\n\
  - SHOW_VARS() -> lists currently defined variables\n\
Inspect the `question` and `context` variables in the REPL before reasoning \
about them. You must terminate by writing, at the start of a line, either \
FINAL(<answer>) or FINAL_VAR(<variable name>)."
        .to_string()
}

/// Assistant preamble summarizing context metadata, appended right after
/// the system prompt in the initial history.
pub fn context_preamble(meta: &ContextMeta, question: Option<&str>) -> String {
    let lengths = match &meta.item_lengths {
        rlm_domain::context::ItemLengths::Full(lengths) => format!("{lengths:?}"),
        rlm_domain::context::ItemLengths::Compacted { count, min, max, mean } => {
            format!("{{count: {count}, min: {min}, max: {max}, mean: {mean:.1}}}")
        }
    };

    let mut preamble = format!(
        "Context loaded: type={:?}, totalChars={}, itemCount={}, lengths={lengths}.\n\
Head preview: {}\n\
Inspect `question` first, then `context`, before writing any reasoning.",
        meta.ty, meta.total_chars, meta.item_count, meta.head_preview
    );

    if let Some(question) = question {
        preamble.push_str(&format!("\nQuestion: {question}"));
    }

    preamble
}

/// The per-turn user instruction appended before each root LM call
/// (spec.md §4.8): differs on the very first iteration.
pub fn turn_instruction(iteration: u32) -> String {
    let lead = if iteration == 1 {
        "Start by reading the question and context variables in the REPL."
    } else {
        "Continue from prior execution outputs."
    };
    format!(
        "{lead} Use ```repl code blocks to run Python, and terminate with \
FINAL(...) or FINAL_VAR(...) once you have the answer."
    )
}

/// Render the user-facing transcript of one executed code block, with
/// stdout/stderr independently truncated at `max_output_chars`
/// (spec.md §4.2, §4.8).
pub fn render_execution_message(
    code: &str,
    result: &ReplExecutionResult,
    max_output_chars: usize,
) -> String {
    let stdout = truncate(&result.stdout, max_output_chars);
    let stderr = truncate(&result.stderr, max_output_chars);
    let variables = if result.locals.is_empty() {
        "(none)".to_string()
    } else {
        result.locals.join(", ")
    };

    format!(
        "Code executed:\n```python\n{code}\n```\n\n\
REPL output:\nSTDOUT:\n{stdout}\n\nSTDERR:\n{stderr}\n\n\
Variables now available: {variables}"
    )
}

/// Final nudge appended on the fallback path (spec.md §4.8 "Fallback path")
/// when `iterationLimit` iterations produced no directive.
pub fn fallback_nudge() -> String {
    "You have reached the iteration limit without producing a final answer. \
Respond now with FINAL(<answer>) or FINAL_VAR(<variable name>) and nothing else."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_domain::context::{Context, ItemLengths};

    #[test]
    fn first_iteration_instruction_mentions_reading() {
        assert!(turn_instruction(1).contains("Start by reading"));
    }

    #[test]
    fn later_iteration_instruction_mentions_continuing() {
        assert!(turn_instruction(2).contains("Continue from prior execution outputs"));
    }

    #[test]
    fn context_preamble_includes_metadata_fields() {
        let meta = ContextMeta::compute(&Context::Text("hello".into()));
        let preamble = context_preamble(&meta, Some("what is 6*7?"));
        assert!(preamble.contains("totalChars"));
        assert!(preamble.contains("what is 6*7?"));
        match meta.item_lengths {
            ItemLengths::Full(_) => {}
            _ => panic!("expected full lengths for a small text context"),
        }
    }

    #[test]
    fn execution_message_lists_variables() {
        let result = ReplExecutionResult {
            stdout: "42\n".into(),
            stderr: String::new(),
            locals: vec!["x".into(), "y".into()],
            execution_time_ms: 5,
        };
        let rendered = render_execution_message("x = 6*7\ny = x", &result, 20_000);
        assert!(rendered.contains("Variables now available: x, y"));
        assert!(rendered.contains("STDOUT:\n42"));
    }

    #[test]
    fn execution_message_with_no_locals_says_none() {
        let result = ReplExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            locals: vec![],
            execution_time_ms: 1,
        };
        let rendered = render_execution_message("pass", &result, 20_000);
        assert!(rendered.contains("Variables now available: (none)"));
    }
}
