use serde::{Deserialize, Serialize};

/// `[server]` config section: the Bridge's bind address and log verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind_host")]
    pub bind_host: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: d_bind_host(),
            log_level: d_log_level(),
        }
    }
}

fn d_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn d_log_level() -> String {
    "info".to_string()
}
