//! Redactor (spec.md §4.7): pure, policy-parameterized size-bounded
//! head/tail truncation with content digests, for anything bound for a log
//! line or an event payload.

use rlm_domain::config::RedactionPolicy;
use sha2::{Digest as _, Sha256};

/// Outcome of redacting one piece of text: the text to actually log/emit,
/// plus whether it was touched at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redacted {
    pub text: String,
    pub redacted: bool,
    pub original_length: usize,
    pub digest: Option<String>,
}

/// SHA-256 hex digest, exactly as the teacher's `runtime::digest::content_hash`.
fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_suffix(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if n >= total {
        return text;
    }
    let skip = total - n;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Sentinel substring present in every marker this module writes. Used to
/// detect text that has already been redacted, so `redact(redact(x)) ==
/// redact(x)` holds instead of re-truncating an already-truncated marker.
const MARKER_SENTINEL: &str = "chars omitted, sha256=";

fn already_redacted(text: &str) -> Option<Redacted> {
    let pos = text.find(MARKER_SENTINEL)?;
    let digest_start = pos + MARKER_SENTINEL.len();
    let digest: String = text[digest_start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if digest.len() != 64 {
        return None;
    }
    Some(Redacted {
        text: text.to_string(),
        redacted: true,
        original_length: text.chars().count(),
        digest: Some(digest),
    })
}

/// Redact `text` against `threshold`, using `head_chars`/`tail_chars` from
/// the head/tail split. Passes through unchanged when `text` is within
/// `threshold`.
fn redact_with(text: &str, threshold: usize, head_chars: usize, tail_chars: usize) -> Redacted {
    if let Some(already) = already_redacted(text) {
        return already;
    }

    let original_length = text.chars().count();
    if original_length <= threshold {
        return Redacted {
            text: text.to_string(),
            redacted: false,
            original_length,
            digest: None,
        };
    }

    let digest = content_hash(text);
    let head = char_prefix(text, head_chars);
    let tail = char_suffix(text, tail_chars);
    let omitted = original_length.saturating_sub(head.chars().count() + tail.chars().count());
    let marker = format!("\n... [{omitted} chars omitted, sha256={digest}] ...\n");

    Redacted {
        text: format!("{head}{marker}{tail}"),
        redacted: true,
        original_length,
        digest: Some(digest),
    }
}

/// Redact a subcall prompt against `policy.max_prompt_chars`.
pub fn redact_prompt(text: &str, policy: &RedactionPolicy) -> Redacted {
    redact_with(text, policy.max_prompt_chars, policy.head_chars, policy.tail_chars)
}

/// Redact a REPL stdout/stderr blob against `policy.max_repl_output_chars`.
pub fn redact_repl_output(text: &str, policy: &RedactionPolicy) -> Redacted {
    redact_with(
        text,
        policy.max_repl_output_chars,
        policy.head_chars,
        policy.tail_chars,
    )
}

/// Context previews truncate head-only with a digest (spec.md §4.7) — no
/// tail is kept, since a preview is meant to orient a reader, not replay
/// the full payload.
pub fn redact_context_preview(text: &str, policy: &RedactionPolicy) -> Redacted {
    if let Some(already) = already_redacted(text) {
        return already;
    }
    let original_length = text.chars().count();
    if original_length <= policy.max_context_preview_chars {
        return Redacted {
            text: text.to_string(),
            redacted: false,
            original_length,
            digest: None,
        };
    }
    let digest = content_hash(text);
    let head = char_prefix(text, policy.max_context_preview_chars);
    let omitted = original_length - head.chars().count();
    let marker = format!("\n... [{omitted} chars omitted, sha256={digest}] ...");
    Redacted {
        text: format!("{head}{marker}"),
        redacted: true,
        original_length,
        digest: Some(digest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RedactionPolicy {
        RedactionPolicy {
            max_prompt_chars: 20,
            max_context_preview_chars: 10,
            max_repl_output_chars: 20,
            head_chars: 5,
            tail_chars: 3,
        }
    }

    #[test]
    fn short_text_passes_through_unredacted() {
        let r = redact_prompt("hello", &policy());
        assert!(!r.redacted);
        assert_eq!(r.text, "hello");
        assert!(r.digest.is_none());
    }

    #[test]
    fn long_text_is_head_tail_truncated_with_digest() {
        let long = "x".repeat(100);
        let r = redact_prompt(&long, &policy());
        assert!(r.redacted);
        assert!(r.text.starts_with("xxxxx"));
        assert!(r.text.ends_with("xxx"));
        assert!(r.digest.is_some());
        assert_eq!(r.original_length, 100);
    }

    #[test]
    fn redact_is_idempotent() {
        let long = "y".repeat(100);
        let once = redact_prompt(&long, &policy());
        let twice = redact_prompt(&once.text, &policy());
        assert_eq!(once, twice);
    }

    #[test]
    fn context_preview_is_head_only() {
        let long = "z".repeat(100);
        let r = redact_context_preview(&long, &policy());
        assert!(r.redacted);
        assert!(r.text.starts_with("zzzzzzzzzz"));
        assert!(!r.text.ends_with("zzz"));
    }

    #[test]
    fn context_preview_is_idempotent() {
        let long = "w".repeat(100);
        let once = redact_context_preview(&long, &policy());
        let twice = redact_context_preview(&once.text, &policy());
        assert_eq!(once, twice);
    }

    #[test]
    fn multibyte_text_truncates_on_char_boundaries() {
        let long = "é".repeat(50);
        let r = redact_prompt(&long, &policy());
        assert!(r.redacted);
        assert!(r.text.starts_with("ééééé"));
    }
}
