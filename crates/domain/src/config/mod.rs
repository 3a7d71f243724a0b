mod budgets;
mod interpreter;
mod llm;
mod redaction;
mod server;

pub use budgets::BudgetsConfig;
pub use interpreter::InterpreterConfig;
pub use llm::{AuthConfig, AuthMode, LlmConfig, LlmStartupPolicy, ProviderConfig, ProviderKind};
pub use redaction::RedactionPolicy;
pub use server::ServerConfig;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level harness configuration, loaded from TOML (spec.md §6.5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub budgets: BudgetsConfig,
    #[serde(default)]
    pub redaction: RedactionPolicy,
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good; any `Error`-severity issue should
    /// stop the harness from starting.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.budgets.iteration_limit == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "budgets.iteration_limit".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.budgets.subcall_limit == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "budgets.subcall_limit".into(),
                message: "subcalls are disabled; every subcall will be rejected".into(),
            });
        }

        if self.budgets.request_timeout_ms == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "budgets.request_timeout_ms".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.interpreter.command.trim().is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "interpreter.command".into(),
                message: "must not be empty".into(),
            });
        } else if !command_resolves(&self.interpreter.command) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "interpreter.command".into(),
                message: format!("'{}' was not found on PATH", self.interpreter.command),
            });
        }

        if self.llm.providers.is_empty()
            && self.llm.startup_policy == LlmStartupPolicy::RequireOne
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "llm.providers".into(),
                message: "no providers configured but startup_policy is require_one".into(),
            });
        }

        for role in ["root", "sub"] {
            if !self.llm.roles.contains_key(role) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.roles.{role}"),
                    message: "no model assigned for this role".into(),
                });
            }
        }

        issues
    }
}

/// Whether `command` resolves to an executable, either as an absolute/
/// relative path or by searching `PATH` (mirrors what a shell would do,
/// without shelling out).
fn command_resolves(command: &str) -> bool {
    let path = std::path::Path::new(command);
    if path.is_absolute() || command.contains(std::path::MAIN_SEPARATOR) {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(command).is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_budget_defaults() {
        let config = Config::default();
        assert_eq!(config.budgets.iteration_limit, 16);
    }

    #[test]
    fn zero_iteration_limit_is_an_error() {
        let mut config = Config::default();
        config.budgets.iteration_limit = 0;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "budgets.iteration_limit" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn zero_subcall_limit_is_a_warning_not_an_error() {
        let mut config = Config::default();
        config.budgets.subcall_limit = 0;
        let issues = config.validate();
        let issue = issues
            .iter()
            .find(|i| i.field == "budgets.subcall_limit")
            .unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn empty_interpreter_command_is_an_error() {
        let mut config = Config::default();
        config.interpreter.command = "   ".into();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "interpreter.command" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn missing_role_assignment_is_a_warning() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.field == "llm.roles.root"));
        assert!(issues.iter().any(|i| i.field == "llm.roles.sub"));
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.budgets.iteration_limit, config.budgets.iteration_limit);
    }
}
