use super::helpers::{make_agent, open_memory, resolve_requests};
use crate::cli::PlanCmd;
use crate::config::Config;
use crate::error::Result;
use crate::memory::Memory;
use crate::plan::{InstallationPlan, PlanGenerator, PlannerSession};

pub fn execute(config: &Config, cmd: &PlanCmd) -> Result<()> {
    let agent = make_agent(config);
    let memory = open_memory(config)?;
    let mut session = PlannerSession::new(PlanGenerator::new(config.generator_settings()));

    let source = resolve_requests(&cmd.source, &mut session, agent.as_ref(), &memory, config)?;
    let plan = session.plan_for(&source.environment, &source.requests, &memory.memory_context())?;

    if cmd.json {
        let document = serde_json::json!({
            "summary": plan.summary(),
            "review": plan.review(),
            "steps": plan.steps(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_plan(&plan);
    }

    Ok(())
}

/// Human-readable plan listing, followed by the review findings
pub fn print_plan(plan: &InstallationPlan) {
    let summary = plan.summary();

    println!("Plan {} for: {}", summary.id, summary.environment);
    println!(
        "  {} steps ({} tools, {} extensions, {} portals, {} validations)",
        summary.total_steps,
        summary.kinds.tools,
        summary.kinds.extensions,
        summary.kinds.portals,
        summary.kinds.validations
    );
    println!(
        "  Estimated: {:.1} min, complexity: {}",
        summary.estimated_duration_minutes, summary.complexity
    );
    println!();

    for (i, step) in plan.steps().iter().enumerate() {
        println!("{:>3}. {} [{}]", i + 1, step.name(), step.kind());
        let command = if step.command().is_empty() {
            step.check_command()
        } else {
            step.command()
        };
        if !command.is_empty() {
            println!("     $ {}", command);
        }
        if let Some(url) = step.portal_url() {
            println!("     open {}", url);
        }
        if !step.dependencies().is_empty() {
            let deps: Vec<&str> = step.dependencies().iter().map(String::as_str).collect();
            println!("     after: {}", deps.join(", "));
        }
    }

    let review = plan.review();
    for error in &review.errors {
        println!("✗ {}", error);
    }
    for warning in &review.warnings {
        println!("⚠ {}", warning);
    }
    for suggestion in &review.suggestions {
        println!("→ {}", suggestion);
    }
}
