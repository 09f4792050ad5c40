//! Runs a single step: pre-check, command attempts, backoff and repair.

use super::process::{self, CommandOutput};
use crate::agent::{Agent, RepairRequest};
use crate::plan::step::{Step, StepKind};
use crate::utils::shell::{escape, first_line};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why one command attempt did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("{message}")]
    Command { code: i32, message: String },

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{0}")]
    Launch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry failed attempts inside one `execute` call
    pub auto_retry: bool,
    /// Backoff before retry n is `backoff_base * 2^n`
    pub backoff_base: Duration,
    /// Ask the agent for a repaired command between attempts
    pub self_heal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_retry: true,
            backoff_base: Duration::from_secs(1),
            self_heal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub version: Option<String>,
    /// Command attempts made (0 when the pre-check found the tool)
    pub attempts: u32,
    /// Attempts beyond the first
    pub retries: u32,
    pub already_installed: bool,
    /// Last command run, after any repair
    pub command: String,
    pub failure: Option<Failure>,
}

impl ExecutionOutcome {
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }

    fn detected(version: Option<String>) -> Self {
        Self {
            success: true,
            version,
            already_installed: true,
            ..Default::default()
        }
    }
}

/// Executes one step at a time. Never returns an error: every failure is
/// reported in the [`ExecutionOutcome`].
pub struct StepExecutor<'a> {
    agent: Option<&'a dyn Agent>,
    policy: RetryPolicy,
    probe_timeout: Duration,
    portal_opener: String,
}

impl<'a> StepExecutor<'a> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            agent: None,
            policy,
            probe_timeout: Duration::from_secs(10),
            portal_opener: default_opener().to_string(),
        }
    }

    pub fn with_agent(mut self, agent: &'a dyn Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_portal_opener(mut self, opener: impl Into<String>) -> Self {
        let opener = opener.into();
        if !opener.trim().is_empty() {
            self.portal_opener = opener;
        }
        self
    }

    pub fn execute(&self, step: &Step, system_context: &str) -> ExecutionOutcome {
        let command = match step.kind() {
            StepKind::ToolInstall | StepKind::ExtensionInstall => {
                if let Some(version) = self.detect_installed(step) {
                    info!("{} is already installed, skipping command", step.name());
                    return ExecutionOutcome::detected(version);
                }
                install_command(step)
            }
            StepKind::LoginPortal => step
                .portal_url()
                .map(|url| format!("{} {}", self.portal_opener, escape(url)))
                .or_else(|| non_empty(step.command())),
            StepKind::Validation => Some(non_empty(step.check_command()).unwrap_or_else(|| {
                format!("{} --version", escape(&step.tool_name().trim().to_lowercase()))
            })),
        };

        let Some(command) = command else {
            let failure = Failure::Launch(format!("No command to run for {}", step.name()));
            warn!("{}", failure);
            return ExecutionOutcome {
                failure: Some(failure),
                ..Default::default()
            };
        };

        self.run_with_retries(step, command, system_context)
    }

    fn run_with_retries(&self, step: &Step, initial: String, system_context: &str) -> ExecutionOutcome {
        let budget = if self.policy.auto_retry {
            step.max_retries().saturating_sub(step.retry_count())
        } else {
            0
        };
        let timeout = Duration::from_secs(step.timeout_secs());

        let mut command = initial;
        let mut attempts = 0;
        let mut retries = 0;

        loop {
            attempts += 1;
            info!("Attempt {} for {}: {}", attempts, step.name(), command);

            let (output, failure) = self.attempt(step, &command, timeout);
            let (stdout, stderr) = output
                .map(|o| (o.stdout, o.stderr))
                .unwrap_or_default();

            let Some(failure) = failure else {
                let version = match step.kind() {
                    StepKind::Validation => version_text(&stdout, &stderr),
                    StepKind::LoginPortal => None,
                    _ => self.detect_installed(step).flatten(),
                };
                info!("{} succeeded after {} attempt(s)", step.name(), attempts);
                return ExecutionOutcome {
                    success: true,
                    stdout,
                    stderr,
                    version,
                    attempts,
                    retries,
                    already_installed: false,
                    command,
                    failure: None,
                };
            };

            warn!("{} attempt {} failed: {}", step.name(), attempts, failure);

            if retries >= budget {
                return ExecutionOutcome {
                    success: false,
                    stdout,
                    stderr,
                    version: None,
                    attempts,
                    retries,
                    already_installed: false,
                    command,
                    failure: Some(failure),
                };
            }
            retries += 1;

            let delay = backoff(self.policy.backoff_base, step.retry_count() + retries);
            if !delay.is_zero() {
                debug!("Backing off {:.1}s before retrying {}", delay.as_secs_f64(), step.name());
                thread::sleep(delay);
            }

            if let Some(repaired) = self.repair(step, &command, &stderr, system_context) {
                info!("Using repaired command for {}: {}", step.name(), repaired);
                command = repaired;
            }
        }
    }

    /// Run one attempt; a present `Failure` means the attempt did not succeed
    fn attempt(
        &self,
        step: &Step,
        command: &str,
        timeout: Duration,
    ) -> (Option<CommandOutput>, Option<Failure>) {
        let output = match process::run_shell(command, timeout) {
            Ok(output) => output,
            Err(e) => return (None, Some(Failure::Launch(e.to_string()))),
        };

        let failure = if output.timed_out {
            Some(Failure::Timeout {
                seconds: timeout.as_secs(),
            })
        } else if !output.success() {
            Some(Failure::Command {
                code: output.code.unwrap_or(-1),
                message: output.error_text(),
            })
        } else if step.kind() == StepKind::Validation && !lists_extension(step, &output.stdout) {
            Some(Failure::Command {
                code: 0,
                message: format!(
                    "extension {} is not listed",
                    step.extension_id().unwrap_or_default()
                ),
            })
        } else {
            None
        };

        (Some(output), failure)
    }

    fn repair(
        &self,
        step: &Step,
        command: &str,
        stderr: &str,
        system_context: &str,
    ) -> Option<String> {
        if !self.policy.self_heal {
            return None;
        }
        let agent = self.agent?;

        let request = RepairRequest {
            failing_command: command,
            stderr,
            tool_name: step.tool_name(),
            system_context,
        };
        let repaired = agent.repair_command(&request)?;
        let repaired = repaired.trim();

        if repaired.is_empty() || repaired == command {
            debug!("{} offered no different command", agent.name());
            return None;
        }
        Some(repaired.to_string())
    }

    /// Probe for an existing install. `Some(version)` when found.
    fn detect_installed(&self, step: &Step) -> Option<Option<String>> {
        let probes = match non_empty(step.check_command()) {
            Some(check) => vec![check],
            None if step.kind() == StepKind::ExtensionInstall => {
                vec![crate::plan::generator::EXTENSION_LIST_COMMAND.to_string()]
            }
            None => generic_probes(step.tool_name()),
        };

        for probe in probes {
            let output = match process::run_shell(&probe, self.probe_timeout) {
                Ok(output) if output.success() => output,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Probe '{}' could not run: {}", probe, e);
                    continue;
                }
            };

            if step.kind() == StepKind::ExtensionInstall {
                let Some(id) = step.extension_id() else {
                    continue;
                };
                let id = id.to_lowercase();
                if let Some(line) = output
                    .stdout
                    .lines()
                    .find(|line| line.to_lowercase().contains(&id))
                {
                    return Some(Some(line.trim().to_string()));
                }
                continue;
            }

            debug!("Probe '{}' succeeded", probe);
            return Some(version_text(&output.stdout, &output.stderr));
        }

        None
    }
}

fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn install_command(step: &Step) -> Option<String> {
    non_empty(step.command()).or_else(|| match (step.kind(), step.extension_id()) {
        (StepKind::ExtensionInstall, Some(id)) => {
            Some(format!("code --install-extension {}", escape(id)))
        }
        _ => None,
    })
}

/// Generic presence checks for a tool without a check command
fn generic_probes(tool_name: &str) -> Vec<String> {
    let name = escape(&tool_name.trim().to_lowercase());
    vec![
        format!("{} --version", name),
        format!("{} -v", name),
        format!("which {}", name),
    ]
}

/// Validation steps for extensions must see their id in the listing
fn lists_extension(step: &Step, stdout: &str) -> bool {
    match step.extension_id() {
        Some(id) => stdout.to_lowercase().contains(&id.to_lowercase()),
        None => true,
    }
}

fn version_text(stdout: &str, stderr: &str) -> Option<String> {
    first_line(stdout).or_else(|| first_line(stderr))
}

/// Longest wait between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(300);

fn backoff(base: Duration, exponent: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(exponent))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::error::Result;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn no_backoff() -> RetryPolicy {
        RetryPolicy {
            backoff_base: Duration::ZERO,
            ..Default::default()
        }
    }

    fn tool(name: &str, command: &str) -> Step {
        Step::new(StepKind::ToolInstall, name, command).with_check_command("false")
    }

    struct FixedRepair {
        command: String,
        seen: RefCell<Vec<String>>,
    }

    impl Agent for FixedRepair {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate_plan(&self, _environment: &str, _memory_context: &str) -> Result<String> {
            Ok(String::new())
        }

        fn repair_command(&self, request: &RepairRequest<'_>) -> Option<String> {
            self.seen.borrow_mut().push(request.failing_command.to_string());
            Some(self.command.clone())
        }
    }

    #[test]
    fn test_precheck_short_circuits() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let step = Step::new(
            StepKind::ToolInstall,
            "present",
            format!("touch {}", marker.display()),
        )
        .with_check_command("echo present 1.2.3");

        let outcome = StepExecutor::new(no_backoff()).execute(&step, "");

        assert!(outcome.success);
        assert!(outcome.already_installed);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.version.as_deref(), Some("present 1.2.3"));
        assert!(!marker.exists());
    }

    #[test]
    fn test_failing_command_uses_whole_budget() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("attempts");
        let step = tool("broken", &format!("echo x >> {}; false", log.display()))
            .with_max_retries(2);

        let outcome = StepExecutor::new(no_backoff()).execute(&step, "");

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries, 2);
        let runs = std::fs::read_to_string(&log).unwrap();
        assert_eq!(runs.lines().count(), 3);
        assert!(matches!(outcome.failure, Some(Failure::Command { code: 1, .. })));
    }

    #[test]
    fn test_auto_retry_disabled() {
        let policy = RetryPolicy {
            auto_retry: false,
            ..no_backoff()
        };
        let outcome = StepExecutor::new(policy).execute(&tool("broken", "false"), "");

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries, 0);
    }

    #[test]
    fn test_timeout_message() {
        let step = tool("slow", "sleep 5")
            .with_timeout_secs(1)
            .with_max_retries(0);

        let outcome = StepExecutor::new(no_backoff()).execute(&step, "");

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(Failure::Timeout { seconds: 1 }));
        assert_eq!(outcome.error_message().as_deref(), Some("timed out after 1s"));
    }

    #[test]
    fn test_repair_substitutes_command() {
        let agent = FixedRepair {
            command: "true".to_string(),
            seen: RefCell::new(Vec::new()),
        };
        let step = tool("fixable", "false").with_max_retries(2);

        let outcome = StepExecutor::new(no_backoff())
            .with_agent(&agent)
            .execute(&step, "linux");

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.command, "true");
        assert_eq!(agent.seen.borrow().as_slice(), ["false"]);
    }

    #[test]
    fn test_repair_ignored_when_self_heal_off() {
        let agent = FixedRepair {
            command: "true".to_string(),
            seen: RefCell::new(Vec::new()),
        };
        let policy = RetryPolicy {
            self_heal: false,
            ..no_backoff()
        };
        let step = tool("fixable", "false").with_max_retries(1);

        let outcome = StepExecutor::new(policy).with_agent(&agent).execute(&step, "");

        assert!(!outcome.success);
        assert!(agent.seen.borrow().is_empty());
    }

    #[test]
    fn test_validation_captures_version() {
        let target = Step::new(StepKind::ToolInstall, "shell", "");
        let step = Step::validation_of(&target, "echo 'GNU bash, version 5'");

        let outcome = StepExecutor::new(no_backoff()).execute(&step, "");

        assert!(outcome.success);
        assert_eq!(outcome.version.as_deref(), Some("GNU bash, version 5"));
    }

    #[test]
    fn test_extension_validation_requires_listing() {
        let ext = Step::new(StepKind::ExtensionInstall, "YAML Extension", "")
            .with_extension_id("redhat.vscode-yaml");
        let listed = Step::validation_of(&ext, "printf 'ms-python.python\\nredhat.vscode-yaml\\n'")
            .with_max_retries(0);
        let missing = Step::validation_of(&ext, "echo ms-python.python").with_max_retries(0);

        let executor = StepExecutor::new(no_backoff());
        assert!(executor.execute(&listed, "").success);
        assert!(!executor.execute(&missing, "").success);
    }

    #[test]
    fn test_portal_uses_opener() {
        let step = Step::new(StepKind::LoginPortal, "GitHub", "")
            .with_portal_url("https://github.com/login");

        let outcome = StepExecutor::new(no_backoff())
            .with_portal_opener("echo")
            .execute(&step, "");

        assert!(outcome.success);
        assert_eq!(outcome.stdout.trim(), "https://github.com/login");
    }

    #[test]
    fn test_missing_command_is_a_failure() {
        let outcome = StepExecutor::new(no_backoff()).execute(&tool("nothing", ""), "");

        assert!(!outcome.success);
        assert!(matches!(outcome.failure, Some(Failure::Launch(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(200));
        assert_eq!(backoff(base, 3), Duration::from_millis(800));
        assert_eq!(backoff(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(Duration::from_secs(1), 10), MAX_BACKOFF);
        assert_eq!(backoff(Duration::from_secs(1), 40), MAX_BACKOFF);
        assert_eq!(backoff(Duration::from_secs(u64::MAX / 2), 4), MAX_BACKOFF);
    }
}
