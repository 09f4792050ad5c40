use configo::agent::{Agent, RepairRequest};
use configo::error::Result;
use configo::executor::{Installer, RetryPolicy, StepExecutor};
use configo::memory::{JsonMemory, Memory, MemoryPolicy};
use configo::plan::{GeneratorSettings, PlanGenerator, StepStatus, ToolRequest};
use configo::ui::SilentUi;
use configo::utils::shell::escape;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Repairs every failing command into `touch <marker>`
struct TouchAgent(String);

impl Agent for TouchAgent {
    fn name(&self) -> &str {
        "touch"
    }

    fn generate_plan(&self, _environment: &str, _memory_context: &str) -> Result<String> {
        Ok(String::new())
    }

    fn repair_command(&self, _request: &RepairRequest<'_>) -> Option<String> {
        Some(self.0.clone())
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        auto_retry: true,
        backoff_base: Duration::ZERO,
        self_heal: true,
    }
}

fn generator(max_retries: u32) -> PlanGenerator {
    PlanGenerator::new(GeneratorSettings {
        max_retries,
        ..Default::default()
    })
}

fn marker_check(marker: &Path) -> String {
    format!("test -f {}", escape(&marker.to_string_lossy()))
}

#[test]
fn failed_dependency_skips_dependents() {
    let plan = generator(1)
        .generate(
            &[
                ToolRequest::tool("Docker", "false").with_check_command("false"),
                ToolRequest::tool("curl", "false").with_check_command("false"),
            ],
            "containers",
            "",
        )
        .unwrap();
    assert_eq!(plan.steps()[0].id(), "tool_curl");

    let mut ui = SilentUi;
    let report = Installer::new(StepExecutor::new(policy()), &mut ui)
        .run(plan)
        .unwrap();

    assert!(!report.succeeded);
    let status = |id: &str| report.steps.iter().find(|s| s.id == id).unwrap();

    assert_eq!(status("tool_curl").status, StepStatus::Failed);
    assert_eq!(status("tool_curl").attempts, 2);
    assert_eq!(status("tool_docker").status, StepStatus::Skipped);
    assert_eq!(
        status("tool_docker").error.as_deref(),
        Some("Skipped: dependency 'tool_curl' did not complete")
    );
    assert_eq!(status("validate_docker").status, StepStatus::Skipped);
    assert_eq!(report.plan.failed_count(), 1);
    assert_eq!(report.plan.skipped_count(), 3);
}

#[test]
fn repaired_command_is_used_and_remembered() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("tool");
    let agent = TouchAgent(format!("touch {}", escape(&marker.to_string_lossy())));
    let mut memory = JsonMemory::open(dir.path().join("memory.json"), MemoryPolicy::default()).unwrap();

    let plan = generator(3)
        .generate(
            &[ToolRequest::tool("widget", "false").with_check_command(marker_check(&marker))],
            "widgets",
            "",
        )
        .unwrap();

    let mut ui = SilentUi;
    let report = Installer::new(StepExecutor::new(policy()).with_agent(&agent), &mut ui)
        .with_memory(&mut memory)
        .run(plan)
        .unwrap();

    assert!(report.succeeded);
    assert!(marker.exists());
    assert_eq!(report.steps[0].attempts, 2);
    assert_eq!(report.steps[0].retries, 1);

    let reloaded = JsonMemory::open(dir.path().join("memory.json"), MemoryPolicy::default()).unwrap();
    let remembered = reloaded.tool_memory("widget").unwrap();
    assert!(remembered.install_succeeded_before);
    assert!(remembered.last_command.starts_with("touch "));
}

#[test]
fn repeated_failures_are_skipped_next_time() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.json");
    let policy_one_failure = MemoryPolicy {
        skip_already_installed: true,
        max_failures: 1,
    };
    let request = [ToolRequest::tool("widget", "false").with_check_command("false")];

    let mut memory = JsonMemory::open(&path, policy_one_failure).unwrap();
    let mut ui = SilentUi;
    let report = Installer::new(StepExecutor::new(policy()), &mut ui)
        .with_memory(&mut memory)
        .run(generator(0).generate(&request, "w", "").unwrap())
        .unwrap();
    assert_eq!(report.steps[0].status, StepStatus::Failed);
    assert_eq!(report.steps[0].error.as_deref(), Some("exited with code 1"));

    let mut memory = JsonMemory::open(&path, policy_one_failure).unwrap();
    assert!(memory.memory_context().contains("Previously failed tools: widget"));

    let mut ui = SilentUi;
    let report = Installer::new(StepExecutor::new(policy()), &mut ui)
        .with_memory(&mut memory)
        .run(generator(0).generate(&request, "w", "").unwrap())
        .unwrap();

    assert!(report.succeeded);
    assert_eq!(report.steps[0].status, StepStatus::Skipped);
    assert_eq!(
        report.steps[0].error.as_deref(),
        Some("Skipped: failed 1 times previously")
    );
}
