use rlm_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("rlm doctor");
    println!("==========\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_interpreter_command(config, &mut all_passed);
    check_llm_providers(config, &mut all_passed).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    // Missing config is not fatal — Config::default() covers it — so this
    // check doesn't flip all_passed.
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({error_count} error(s))", issues.len()),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

/// Mirrors `rlm_domain::config`'s own PATH-resolution check (spec.md §6.5
/// "the interpreter command doesn't exist on PATH"), surfaced here as its
/// own check since it's the one piece of config validation an operator is
/// most likely to act on immediately.
fn check_interpreter_command(config: &Config, all_passed: &mut bool) {
    let command = &config.interpreter.command;
    let resolves = command_resolves(command);
    print_check(
        "Interpreter command resolves",
        resolves,
        if resolves {
            command.clone()
        } else {
            format!("'{command}' was not found on PATH")
        },
    );
    if !resolves {
        *all_passed = false;
    }
}

fn command_resolves(command: &str) -> bool {
    let path = std::path::Path::new(command);
    if path.is_absolute() || command.contains(std::path::MAIN_SEPARATOR) {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}

async fn check_llm_providers(config: &Config, all_passed: &mut bool) {
    if config.llm.providers.is_empty() {
        print_check("LLM providers configured", false, "none configured".into());
        *all_passed = false;
        return;
    }
    print_check(
        "LLM providers configured",
        true,
        format!("{} provider(s)", config.llm.providers.len()),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build();
    let Ok(client) = client else {
        print_check("LLM provider reachability", false, "failed to build HTTP client".into());
        *all_passed = false;
        return;
    };

    for provider in &config.llm.providers {
        let reachable = client.get(&provider.base_url).send().await.is_ok();
        print_check(
            &format!("Provider '{}' reachable", provider.id),
            reachable,
            if reachable {
                provider.base_url.clone()
            } else {
                format!("{} (unreachable)", provider.base_url)
            },
        );
        // Unreachable at `doctor` time doesn't necessarily mean completion
        // would fail (some endpoints 404 a bare GET but still serve POST
        // /chat/completions), so this check is informational, not fatal.
    }

    for role in ["root", "sub"] {
        let assigned = config.llm.roles.contains_key(role);
        print_check(
            &format!("Role '{role}' assigned"),
            assigned,
            if assigned {
                config.llm.roles[role].clone()
            } else {
                "no model assigned".into()
            },
        );
        if !assigned {
            *all_passed = false;
        }
    }
}
