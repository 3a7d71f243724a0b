use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod config;
pub mod doctor;

/// `rlm` — a thin, local stand-in for the out-of-scope web UI / CLI front
/// end (SPEC_FULL.md §6.6): run one `completion` and print the result, or
/// diagnose the current configuration.
#[derive(Debug, Parser)]
#[command(name = "rlm", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one completion against the configured root/sub models and
    /// interpreter, then print the answer.
    Run {
        /// The question to ask.
        question: String,
        /// Path to a file whose contents become the run's context. A
        /// `.json` file is parsed and mapped to a sequence/mapping context;
        /// anything else is loaded as a plain text context.
        #[arg(long)]
        context_file: Option<PathBuf>,
        /// Print the full runtime event stream to stderr as the run
        /// progresses.
        #[arg(long)]
        verbose: bool,
    },
    /// Validate configuration, check the interpreter command resolves, and
    /// probe the configured LLM provider(s) for reachability.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `RLM_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used, falling back to [`Config::default`] when the file is
/// absent (spec.md §6.5).
pub fn load_config() -> anyhow::Result<(rlm_domain::config::Config, String)> {
    let config_path = std::env::var("RLM_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        rlm_domain::config::Config::default()
    };

    Ok((config, config_path))
}
