use serde::{Deserialize, Serialize};

/// Terminal marker parsed from root model output (spec.md §3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalDirective {
    Final { value: String },
    FinalVar { value: String },
    FallbackText { value: String },
}

impl FinalDirective {
    pub fn kind_str(&self) -> &'static str {
        match self {
            FinalDirective::Final { .. } => "final",
            FinalDirective::FinalVar { .. } => "final_var",
            FinalDirective::FallbackText { .. } => "fallback_text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_str_matches_variant() {
        assert_eq!(FinalDirective::Final { value: "x".into() }.kind_str(), "final");
        assert_eq!(
            FinalDirective::FinalVar { value: "x".into() }.kind_str(),
            "final_var"
        );
        assert_eq!(
            FinalDirective::FallbackText { value: "x".into() }.kind_str(),
            "fallback_text"
        );
    }

    #[test]
    fn serializes_with_tagged_kind() {
        let d = FinalDirective::Final { value: "42".into() };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], serde_json::json!("final"));
        assert_eq!(json["value"], serde_json::json!("42"));
    }
}
