use crate::cli::ConfigCommands;
use crate::config::{global_config_path, Config, CONFIG_FILE_NAME};
use crate::error::Result;
use std::path::{Path, PathBuf};

pub fn execute(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { file } => validate(file.as_deref()),
        ConfigCommands::Show => show(),
    }
}

fn validate(file: Option<&Path>) -> Result<()> {
    if let Some(path) = file {
        println!("Validating {}...", path.display());
        return report(Config::from_file(path).and_then(|c| c.validate()));
    }

    let project_root = std::env::current_dir()?;
    let project_config = project_root.join(CONFIG_FILE_NAME);
    let global_config =
        global_config_path().unwrap_or_else(|| PathBuf::from("~").join(CONFIG_FILE_NAME));

    println!("Validating configuration files...\n");

    if global_config.exists() {
        println!("  Global config: {}", global_config.display());
    } else {
        println!(
            "  Global config: {} - not found (optional)",
            global_config.display()
        );
    }

    if project_config.exists() {
        println!("  Project config: {}", project_config.display());
    } else {
        println!(
            "  Project config: {} - not found (optional)",
            project_config.display()
        );
    }

    // Loading the merged config validates all files
    println!("\nLoading and validating configuration...");
    report(Config::load(&project_root).map(|_| ()))
}

fn report(result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => {
            println!("✓ Configuration is valid!");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration is invalid!");
            println!("  Error: {}", e);
            Err(e)
        }
    }
}

fn show() -> Result<()> {
    let config = Config::load(&std::env::current_dir()?)?;

    println!("Effective Configuration:");
    println!("(CLI > Environment > Project config > Global config > Defaults)\n");

    println!("Execution:");
    println!("  max_retries: {}", config.execution.max_retries);
    println!("  timeout: {}s", config.execution.timeout_seconds);
    println!("  probe_timeout: {}s", config.execution.probe_timeout_seconds);
    println!("  backoff_base: {}ms", config.execution.backoff_base_ms);
    println!("  auto_retry: {}", config.execution.auto_retry);
    println!("  self_heal: {}", config.execution.self_heal);

    println!("\nValidation:");
    println!("  enabled: {}", config.validation.enabled);
    println!("  timeout: {}s", config.validation.timeout_seconds);

    println!("\nMemory:");
    println!("  enabled: {}", config.memory.enabled);
    println!("  path: {}", config.memory_path().display());
    println!("  skip_already_installed: {}", config.memory.skip_already_installed);
    println!("  max_failures: {}", config.memory.max_failures);

    println!("\nAgent:");
    if config.agent.command.is_empty() {
        println!("  command: (offline)");
    } else {
        println!("  command: {}", config.agent.command);
    }
    println!("  timeout: {}s", config.agent.timeout_seconds);

    println!("\nPortal:");
    println!("  enabled: {}", config.portal.enabled);
    if !config.portal.opener.is_empty() {
        println!("  opener: {}", config.portal.opener);
    }

    Ok(())
}
