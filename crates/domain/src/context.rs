use serde::{Deserialize, Serialize};

/// The context payload handed to `completion`: a string, an ordered sequence
/// of arbitrary serializable items, or a mapping of named fields to items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Context {
    Text(String),
    Sequence(Vec<serde_json::Value>),
    Mapping(serde_json::Map<String, serde_json::Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Text,
    Sequence,
    Mapping,
}

/// Per-item length summary, compacted once an item count exceeds 100
/// entries so the metadata itself stays bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemLengths {
    Full(Vec<usize>),
    Compacted {
        count: usize,
        min: usize,
        max: usize,
        mean: f64,
    },
}

const COMPACT_THRESHOLD: usize = 100;

impl ItemLengths {
    fn from_lengths(lengths: Vec<usize>) -> Self {
        if lengths.len() <= COMPACT_THRESHOLD {
            return ItemLengths::Full(lengths);
        }
        let count = lengths.len();
        let min = *lengths.iter().min().unwrap_or(&0);
        let max = *lengths.iter().max().unwrap_or(&0);
        let mean = lengths.iter().sum::<usize>() as f64 / count as f64;
        ItemLengths::Compacted {
            count,
            min,
            max,
            mean,
        }
    }
}

/// Context metadata retained on the run for the lifetime of `completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMeta {
    #[serde(rename = "type")]
    pub ty: ContextType,
    pub total_chars: usize,
    pub item_lengths: ItemLengths,
    pub item_count: usize,
    pub head_preview: String,
}

const HEAD_PREVIEW_CHARS: usize = 500;

impl ContextMeta {
    pub fn compute(context: &Context) -> Self {
        let canonical = canonical_serialize(context);
        let total_chars = canonical.chars().count();
        let head_preview = head_preview_of(&canonical, HEAD_PREVIEW_CHARS);

        match context {
            Context::Text(s) => ContextMeta {
                ty: ContextType::Text,
                total_chars,
                item_lengths: ItemLengths::Full(vec![s.chars().count()]),
                item_count: 1,
                head_preview,
            },
            Context::Sequence(items) => {
                let lengths: Vec<usize> = items.iter().map(item_len).collect();
                ContextMeta {
                    ty: ContextType::Sequence,
                    total_chars,
                    item_count: items.len(),
                    item_lengths: ItemLengths::from_lengths(lengths),
                    head_preview,
                }
            }
            Context::Mapping(map) => {
                let lengths: Vec<usize> = map.values().map(item_len).collect();
                ContextMeta {
                    ty: ContextType::Mapping,
                    total_chars,
                    item_count: map.len(),
                    item_lengths: ItemLengths::from_lengths(lengths),
                    head_preview,
                }
            }
        }
    }
}

fn item_len(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

fn canonical_serialize(context: &Context) -> String {
    match context {
        Context::Text(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Head-only preview, char-boundary-safe (UTF-8 chars may be multi-byte).
fn head_preview_of(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_context_meta_counts_one_item() {
        let meta = ContextMeta::compute(&Context::Text("hello world".into()));
        assert_eq!(meta.item_count, 1);
        assert_eq!(meta.ty, ContextType::Text);
    }

    #[test]
    fn sequence_lengths_stay_full_under_threshold() {
        let items = vec![serde_json::json!("a"), serde_json::json!("bb")];
        let meta = ContextMeta::compute(&Context::Sequence(items));
        match meta.item_lengths {
            ItemLengths::Full(v) => assert_eq!(v, vec![1, 2]),
            _ => panic!("expected full lengths"),
        }
    }

    #[test]
    fn sequence_lengths_compact_over_threshold() {
        let items: Vec<serde_json::Value> = (0..150).map(|i| serde_json::json!(i)).collect();
        let meta = ContextMeta::compute(&Context::Sequence(items));
        match meta.item_lengths {
            ItemLengths::Compacted { count, .. } => assert_eq!(count, 150),
            _ => panic!("expected compacted lengths"),
        }
    }

    #[test]
    fn head_preview_truncates_long_text() {
        let long = "x".repeat(10_000);
        let meta = ContextMeta::compute(&Context::Text(long));
        assert!(meta.head_preview.len() < meta.total_chars);
    }
}
