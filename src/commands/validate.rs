use crate::cli::ValidateCmd;
use crate::config::Config;
use crate::error::Result;
use crate::validator::{AggregateResult, ValidationSummary, Validator};
use std::time::Duration;

/// Returns true when every probe passed
pub fn execute(config: &Config, cmd: &ValidateCmd) -> Result<bool> {
    let validator = Validator::new(Duration::from_secs(config.validation.timeout_seconds));

    let mut results = Vec::new();
    if cmd.system {
        results.push(validator.validate_system());
    }
    if cmd.environment {
        results.push(validator.validate_environment());
    }
    results.extend(validator.validate_all(&cmd.tools));

    print_results(&results);
    print_summary(&ValidationSummary::from_results(&results));
    Ok(results.iter().all(|r| r.passed))
}

pub fn print_results(results: &[AggregateResult]) {
    for result in results {
        if result.passed {
            println!("✓ {}", result.tool_name);
            continue;
        }

        println!("✗ {}", result.tool_name);
        for diagnosis in &result.diagnoses {
            println!("    {}: {}", diagnosis.probe_name, diagnosis.error_message);
            for suggestion in &diagnosis.suggestions {
                println!("      → {}", suggestion);
            }
        }
    }
}

pub fn print_summary(summary: &ValidationSummary) {
    println!(
        "\n{}/{} probes passed ({:.0}%)",
        summary.passed_probes,
        summary.total_probes,
        summary.success_rate * 100.0
    );
    if !summary.failed_tools.is_empty() {
        println!("Failed: {}", summary.failed_tools.join(", "));
    }
}
