use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `[interpreter]` config section: how to spawn the worker child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}
