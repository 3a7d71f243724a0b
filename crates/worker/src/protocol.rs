use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Line-delimited requests sent on the worker's stdin (spec.md §6.1).
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum WorkerRequest {
    Init {
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        context_file_path: Option<String>,
        bridge_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<String>,
    },
    Exec {
        code: String,
    },
    FinalVar {
        name: String,
    },
    Close {},
}

/// Line-delimited responses read from the worker's stdout. Every command
/// shares `{ok}`; the remaining fields are populated per-command and are
/// simply absent for commands that don't produce them.
#[derive(Debug, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub locals: Option<HashMap<String, String>>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_serializes_with_cmd_tag() {
        let req = WorkerRequest::Init {
            context: Some(serde_json::json!("hello")),
            context_file_path: None,
            bridge_url: "http://127.0.0.1:9000".into(),
            question: Some("what is 6*7?".into()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["cmd"], serde_json::json!("init"));
        assert_eq!(json["bridge_url"], serde_json::json!("http://127.0.0.1:9000"));
        assert!(json.get("context_file_path").is_none());
    }

    #[test]
    fn close_request_has_only_cmd_field() {
        let req = WorkerRequest::Close {};
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"cmd": "close"}));
    }

    #[test]
    fn response_deserializes_minimal_ok_false() {
        let json = r#"{"ok": false, "error": "boom"}"#;
        let resp: WorkerResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("boom"));
        assert!(resp.stdout.is_none());
    }

    #[test]
    fn exec_response_deserializes_full_shape() {
        let json = r#"{"ok": true, "stdout": "42\n", "stderr": "", "locals": {"x": "42"}, "execution_time": 0.01}"#;
        let resp: WorkerResponse = serde_json::from_str(json).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.stdout.as_deref(), Some("42\n"));
        assert_eq!(resp.locals.unwrap().get("x").map(String::as_str), Some("42"));
    }
}
