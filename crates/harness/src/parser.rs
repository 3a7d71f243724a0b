//! Parser (spec.md §4.2): extracts fenced `repl` code blocks and the
//! terminal directive from root-model output, plus the shared `truncate`
//! helper used when embedding REPL output back into the conversation.

/// One fenced ` ```repl ` block, trimmed of surrounding blank lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplBlock {
    pub code: String,
}

/// Extract all non-empty fenced `repl` blocks, in document order. A block
/// opens on a line that is exactly "```repl" (whitespace trimmed) and
/// closes on the next line that is a bare "```". Empty bodies (after
/// trimming surrounding blank lines) are discarded.
pub fn extract_repl_blocks(text: &str) -> Vec<ReplBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().peekable();
    let mut in_block = false;
    let mut current: Vec<&str> = Vec::new();

    while let Some(line) = lines.next() {
        if !in_block {
            if line.trim() == "```repl" {
                in_block = true;
                current.clear();
            }
            continue;
        }

        if line.trim() == "```" {
            in_block = false;
            let body = trim_blank_lines(&current).join("\n");
            if !body.is_empty() {
                blocks.push(ReplBlock { code: body });
            }
            current.clear();
            continue;
        }

        current.push(line);
    }

    blocks
}

fn trim_blank_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let Some(start) = start else {
        return Vec::new();
    };
    let end = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(start);
    lines[start..=end].to_vec()
}

/// Terminal directive parsed from model output (spec.md §3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDirective {
    Final(String),
    FinalVar(String),
}

/// Parse the terminal directive out of a root response. Case-sensitive,
/// line-anchored: `FINAL_VAR(<name>)` is preferred over `FINAL(<answer>)`
/// when both appear at the start of a non-blank line. `FINAL_VAR`'s
/// argument is trimmed and has one layer of matching quotes stripped;
/// `FINAL`'s argument runs to the line's closing paren at end-of-line.
pub fn parse_directive(text: &str) -> Option<ParsedDirective> {
    let mut final_var: Option<String> = None;
    let mut r#final: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }

        if final_var.is_none() {
            if let Some(rest) = trimmed.strip_prefix("FINAL_VAR(") {
                if let Some(arg) = extract_paren_arg(rest) {
                    final_var = Some(strip_quotes(arg.trim()));
                }
            }
        }

        if r#final.is_none() {
            if let Some(rest) = trimmed.strip_prefix("FINAL(") {
                if let Some(arg) = extract_paren_arg(rest) {
                    r#final = Some(arg.to_string());
                }
            }
        }
    }

    if let Some(name) = final_var {
        return Some(ParsedDirective::FinalVar(name));
    }
    r#final.map(ParsedDirective::Final)
}

/// Given the text right after an opening paren, find the matching close
/// paren at end-of-line and return everything in between.
fn extract_paren_arg(rest_of_line: &str) -> Option<&str> {
    let trimmed_end = rest_of_line.trim_end_matches(['\r']);
    trimmed_end.strip_suffix(')')
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = s.chars().next().unwrap();
        let last = s.chars().last().unwrap();
        if (first == '\'' && last == '\'') || (first == '"' && last == '"') {
            let mut chars = s.chars();
            chars.next();
            chars.next_back();
            return chars.as_str().to_string();
        }
    }
    s.to_string()
}

/// Sentinel substring written onto every marker `truncate` emits. Detected
/// on the way in, mirroring `redact.rs`'s `already_redacted` fast path, so a
/// second call at the same `max` is a no-op even though the marker itself
/// can push the output back over `max`.
const TRUNCATE_MARKER_SENTINEL: &str = "... [truncated ";

/// `truncate(text, max)` (spec.md §4.2): pass through unchanged if
/// `|text| <= max`, else head-truncate with a `"... [truncated N chars]"`
/// marker reporting the number of dropped characters. Idempotent: a string
/// already carrying the marker is returned unchanged rather than truncated
/// again.
pub fn truncate(text: &str, max: usize) -> String {
    if text.contains(TRUNCATE_MARKER_SENTINEL) {
        return text.to_string();
    }
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let omitted = total - max;
    let head: String = text.chars().take(max).collect();
    format!("{head}\n{TRUNCATE_MARKER_SENTINEL}{omitted} chars]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_repl_block_trimmed() {
        let text = "before\n```repl\n\nx = 1\nprint(x)\n\n```\nafter";
        let blocks = extract_repl_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "x = 1\nprint(x)");
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let text = "```repl\na = 1\n```\ntext\n```repl\nb = 2\n```";
        let blocks = extract_repl_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].code, "a = 1");
        assert_eq!(blocks[1].code, "b = 2");
    }

    #[test]
    fn empty_block_after_trim_is_discarded() {
        let text = "```repl\n\n   \n\n```";
        let blocks = extract_repl_blocks(text);
        assert!(blocks.is_empty());
    }

    #[test]
    fn non_repl_fences_are_ignored() {
        let text = "```python\nx = 1\n```";
        let blocks = extract_repl_blocks(text);
        assert!(blocks.is_empty());
    }

    #[test]
    fn extract_round_trips_through_render() {
        let bodies = vec!["a = 1\nprint(a)".to_string(), "b = 2".to_string()];
        let rendered: String = bodies
            .iter()
            .map(|b| format!("```repl\n{b}\n```\n"))
            .collect();
        let parsed = extract_repl_blocks(&rendered);
        let back: Vec<String> = parsed.into_iter().map(|b| b.code).collect();
        assert_eq!(back, bodies);
    }

    #[test]
    fn final_var_preferred_over_final() {
        let text = "reasoning...\nFINAL_VAR(answer)\nFINAL(ignored)";
        assert_eq!(
            parse_directive(text),
            Some(ParsedDirective::FinalVar("answer".into()))
        );
    }

    #[test]
    fn final_var_strips_surrounding_quotes() {
        assert_eq!(
            parse_directive("FINAL_VAR('x')"),
            Some(ParsedDirective::FinalVar("x".into()))
        );
        assert_eq!(
            parse_directive("FINAL_VAR(\"x\")"),
            Some(ParsedDirective::FinalVar("x".into()))
        );
    }

    #[test]
    fn plain_final_extracts_answer() {
        assert_eq!(
            parse_directive("some text\nFINAL(42)"),
            Some(ParsedDirective::Final("42".into()))
        );
    }

    #[test]
    fn directive_must_start_the_line() {
        assert_eq!(parse_directive("not FINAL(42) here"), None);
    }

    #[test]
    fn no_directive_returns_none() {
        assert_eq!(parse_directive("just thinking out loud"), None);
    }

    #[test]
    fn case_sensitive_directive() {
        assert_eq!(parse_directive("final(42)"), None);
    }

    #[test]
    fn truncate_passes_through_short_text() {
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn truncate_marks_omitted_count() {
        let text = "x".repeat(50);
        let out = truncate(&text, 10);
        assert!(out.starts_with(&"x".repeat(10)));
        assert!(out.contains("truncated 40 chars"));
    }

    #[test]
    fn truncate_is_idempotent_at_same_max() {
        let text = "x".repeat(50);
        let once = truncate(&text, 10);
        let twice = truncate(&once, 10);
        assert_eq!(once, twice);
    }
}
