use super::helpers::{make_agent, open_memory, resolve_requests, retry_requests, system_context};
use super::plan::print_plan;
use super::validate::{print_results, print_summary};
use crate::cli::InstallCmd;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{InstallReport, Installer, StepExecutor};
use crate::memory::Memory;
use crate::plan::{PlanGenerator, PlannerSession};
use crate::ui::{ConsoleUi, Ui};
use crate::validator::{ValidationSummary, Validator};
use std::time::Duration;

/// Plan, confirm and run an installation. Returns true when no step failed.
pub fn execute(config: &Config, cmd: &InstallCmd) -> Result<bool> {
    let agent = make_agent(config);
    let mut memory = open_memory(config)?;
    let mut session = PlannerSession::new(PlanGenerator::new(config.generator_settings()));

    let source = if cmd.retry_failed {
        let Some(source) = retry_requests(&memory, &mut session) else {
            println!("No failed installations to retry.");
            return Ok(true);
        };
        memory = memory.retrying_failures();
        source
    } else {
        resolve_requests(&cmd.source, &mut session, agent.as_ref(), &memory, config)?
    };
    let plan = session.plan_for(&source.environment, &source.requests, &memory.memory_context())?;

    print_plan(&plan);
    println!();

    if !plan.review().valid {
        println!("The plan has errors and was not run.");
        return Ok(false);
    }

    let mut ui = ConsoleUi::new(config.assume_yes);
    if !ui.confirm("Proceed with installation?") {
        println!("Installation cancelled.");
        return Ok(true);
    }

    let executor = StepExecutor::new(config.retry_policy())
        .with_agent(agent.as_ref())
        .with_probe_timeout(Duration::from_secs(config.execution.probe_timeout_seconds))
        .with_portal_opener(config.portal.opener.clone());

    let mut installer = Installer::new(executor, &mut ui)
        .with_memory(&mut memory)
        .with_retry_failed(config.execution.auto_retry)
        .with_system_context(system_context(&mut session));
    if config.validation.enabled {
        installer = installer.with_validator(Validator::new(Duration::from_secs(
            config.validation.timeout_seconds,
        )));
    }

    let report = installer.run(plan)?;
    print_report(&report);

    Ok(report.succeeded)
}

fn print_report(report: &InstallReport) {
    let plan = &report.plan;
    println!();
    println!(
        "{} completed, {} failed, {} skipped",
        plan.completed_count(),
        plan.failed_count(),
        plan.skipped_count()
    );

    for step in report.failed_steps() {
        println!(
            "✗ {}: {}",
            step.name,
            step.error.as_deref().unwrap_or("failed")
        );
    }

    if !report.validations.is_empty() {
        println!("\nValidation:");
        print_results(&report.validations);
        print_summary(&ValidationSummary::from_results(&report.validations));
    }

    if report.succeeded {
        println!("\n✓ Installation finished");
    } else {
        println!("\n✗ Installation finished with failures");
    }
}
