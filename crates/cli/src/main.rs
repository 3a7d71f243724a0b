use std::sync::Arc;

use clap::Parser;
use rlm_domain::config::Config;
use rlm_domain::context::Context;
use rlm_domain::run::RunConfig;
use rlm_harness::{CancelToken, CompletionRequest, Harness, LoggingSink, NullSink, ProcessWorkerFactory};
use rlm_providers::ProviderRegistry;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            question,
            context_file,
            verbose,
        } => {
            init_tracing(verbose);
            let (config, _config_path) = cli::load_config()?;
            run_completion(config, question, context_file, verbose).await
        }
        Command::Doctor => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            let valid = cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "info,rlm=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// Load the run's context from `--context-file` (spec.md §6.1): a `.json`
/// file is parsed and mapped to a sequence or mapping context; anything
/// else (or no file at all) becomes plain text.
fn load_context(context_file: Option<std::path::PathBuf>) -> anyhow::Result<Context> {
    let Some(path) = context_file else {
        return Ok(Context::Text(String::new()));
    };

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {} as JSON: {e}", path.display()))?;
        return Ok(match value {
            serde_json::Value::Array(items) => Context::Sequence(items),
            serde_json::Value::Object(map) => Context::Mapping(map),
            other => Context::Text(other.to_string()),
        });
    }

    Ok(Context::Text(raw))
}

fn run_config_from(config: &Config) -> RunConfig {
    RunConfig {
        root_model: config
            .llm
            .roles
            .get("root")
            .cloned()
            .unwrap_or_default(),
        sub_model: config.llm.roles.get("sub").cloned().unwrap_or_default(),
        iteration_limit: config.budgets.iteration_limit,
        subcall_limit: config.budgets.subcall_limit,
        request_timeout_ms: config.budgets.request_timeout_ms,
        max_execution_output_chars: config.budgets.max_execution_output_chars,
        redaction: config.redaction,
    }
}

async fn run_completion(
    config: Config,
    question: String,
    context_file: Option<std::path::PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    let issues = config.validate();
    let errors: Vec<_> = issues
        .iter()
        .filter(|i| i.severity == rlm_domain::config::ConfigSeverity::Error)
        .collect();
    if !errors.is_empty() {
        for issue in &errors {
            eprintln!("{issue}");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let registry = ProviderRegistry::from_config(&config.llm)
        .map_err(|e| anyhow::anyhow!("initializing LLM providers: {e}"))?;

    let (root_client, root_model) = registry
        .resolve_role("root")
        .ok_or_else(|| anyhow::anyhow!("no LLM provider assigned to role 'root'"))?;
    let (sub_client, sub_model) = registry
        .resolve_role("sub")
        .ok_or_else(|| anyhow::anyhow!("no LLM provider assigned to role 'sub'"))?;

    let worker_factory = Arc::new(ProcessWorkerFactory::new(config.interpreter.clone()));

    let sink: Arc<dyn rlm_harness::EventSink> = if verbose {
        Arc::new(LoggingSink::new(NullSink, true))
    } else {
        Arc::new(NullSink)
    };

    let harness = Harness {
        root_client,
        root_model,
        sub_client,
        sub_model,
        worker_factory,
        sink,
        trace_collector: None,
        config: run_config_from(&config),
    };

    let context = load_context(context_file)?;
    let request = CompletionRequest {
        context,
        question: Some(question),
    };

    let result = harness.completion(request, CancelToken::new()).await?;

    println!("{}", result.answer);
    if verbose {
        eprintln!(
            "run {} finished in {} iteration(s) (fallback_used={})",
            result.run_id, result.iterations, result.fallback_used
        );
    }

    Ok(())
}
