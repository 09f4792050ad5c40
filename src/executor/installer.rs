//! Drives a plan to completion.

use super::plan_executor::PlanExecutor;
use super::step_executor::{ExecutionOutcome, StepExecutor};
use crate::error::{ConfigoError, Result};
use crate::memory::{InstallRecord, Memory};
use crate::plan::step::{StepKind, StepStatus};
use crate::plan::InstallationPlan;
use crate::ui::Ui;
use crate::validator::{AggregateResult, Validator};
use serde::Serialize;
use tracing::{info, warn};

/// Final state of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub attempts: u32,
    pub retries: u32,
    pub error: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub plan: InstallationPlan,
    pub steps: Vec<StepReport>,
    pub validations: Vec<AggregateResult>,
    /// No step failed
    pub succeeded: bool,
}

impl InstallReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed)
    }
}

pub struct Installer<'a> {
    executor: StepExecutor<'a>,
    ui: &'a mut dyn Ui,
    memory: Option<&'a mut dyn Memory>,
    validator: Option<Validator>,
    retry_failed: bool,
    system_context: String,
}

impl<'a> Installer<'a> {
    pub fn new(executor: StepExecutor<'a>, ui: &'a mut dyn Ui) -> Self {
        Self {
            executor,
            ui,
            memory: None,
            validator: None,
            retry_failed: true,
            system_context: String::new(),
        }
    }

    pub fn with_memory(mut self, memory: &'a mut dyn Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Validate completed tools once the plan is done
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Whether failed steps are put back through `retry_step`
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    pub fn with_system_context(mut self, context: impl Into<String>) -> Self {
        self.system_context = context.into();
        self
    }

    pub fn run(mut self, mut plan: InstallationPlan) -> Result<InstallReport> {
        self.ui.on_plan_start(&plan);

        let mut executor = PlanExecutor::new(&mut plan);
        while !executor.is_complete() {
            let next = executor
                .next_step()
                .map(|s| (s.id().to_string(), s.kind(), s.tool_name().to_string()));
            let Some((id, kind, tool_name)) = next else {
                self.skip_blocked(&mut executor)?;
                continue;
            };

            if kind.is_install() {
                if let Some(reason) = self.memory_skip_reason(&tool_name) {
                    executor.skip_step(&id, &reason)?;
                    self.report(&executor, &id);
                    continue;
                }
            }

            self.run_step(&mut executor, &id)?;
        }
        self.ui.on_plan_finish();

        let succeeded = executor.succeeded();
        info!(
            "Plan {} finished: {} completed, {} failed, {} skipped",
            executor.plan().id(),
            executor.plan().completed_count(),
            executor.plan().failed_count(),
            executor.plan().skipped_count()
        );

        let validations = match &self.validator {
            Some(validator) => {
                let tools: Vec<&str> = plan
                    .steps()
                    .iter()
                    .filter(|s| s.kind() == StepKind::ToolInstall && s.status() == StepStatus::Completed)
                    .map(|s| s.tool_name())
                    .collect();
                validator.validate_all(&tools)
            }
            None => Vec::new(),
        };

        let steps = plan
            .steps()
            .iter()
            .map(|s| StepReport {
                id: s.id().to_string(),
                name: s.name().to_string(),
                kind: s.kind(),
                status: s.status(),
                attempts: s.attempts(),
                retries: s.retry_count(),
                error: s.error_message().map(str::to_string),
                version: s.version().map(str::to_string),
            })
            .collect();

        Ok(InstallReport {
            plan,
            steps,
            validations,
            succeeded,
        })
    }

    /// Start a step and run it, rerunning it while `retry_step` grants retries
    fn run_step(&mut self, executor: &mut PlanExecutor<'_>, id: &str) -> Result<()> {
        executor.start_step(id)?;

        loop {
            let step = executor
                .plan()
                .step(id)
                .ok_or_else(|| ConfigoError::StepNotFound(id.to_string()))?;
            self.ui.on_step_start(step);
            let outcome = self.executor.execute(step, &self.system_context);
            let (kind, tool_name, command) = (
                step.kind(),
                step.tool_name().to_string(),
                step.command().to_string(),
            );

            executor.record_attempts(id, outcome.attempts, outcome.retries)?;
            if outcome.success {
                executor.complete_step(id, outcome.version.clone())?;
            } else {
                let error = outcome
                    .error_message()
                    .unwrap_or_else(|| "failed".to_string());
                executor.fail_step(id, error)?;
            }

            if kind.is_install() {
                self.remember(&tool_name, &command, &outcome);
            }
            self.report(executor, id);

            if outcome.success || !self.retry_failed || !executor.retry_step(id)? {
                return Ok(());
            }
            executor.start_step(id)?;
        }
    }

    fn skip_blocked(&mut self, executor: &mut PlanExecutor<'_>) -> Result<()> {
        let blocked: Vec<(String, String)> = executor
            .blocked_steps()
            .into_iter()
            .map(|(step, dep)| (step.id().to_string(), dep.to_string()))
            .collect();

        if blocked.is_empty() {
            // Pending steps wait on each other; only a cycle gets here.
            let pending = executor
                .plan()
                .steps()
                .iter()
                .find(|s| !s.status().is_terminal())
                .map(|s| s.id().to_string())
                .unwrap_or_default();
            return Err(ConfigoError::Cycle { step: pending });
        }

        for (id, dep) in blocked {
            executor.skip_step(&id, &format!("dependency '{}' did not complete", dep))?;
            self.report(executor, &id);
        }
        Ok(())
    }

    fn memory_skip_reason(&self, tool_name: &str) -> Option<String> {
        let memory = self.memory.as_deref()?;
        if !memory.should_skip_tool(tool_name) {
            return None;
        }

        let reason = match memory.tool_memory(tool_name) {
            Some(m) if m.install_succeeded_before => "installed previously".to_string(),
            Some(m) => format!("failed {} times previously", m.failure_count),
            None => "skipped by memory".to_string(),
        };
        Some(reason)
    }

    fn remember(&mut self, tool_name: &str, planned_command: &str, outcome: &ExecutionOutcome) {
        let Some(memory) = self.memory.as_deref_mut() else {
            return;
        };

        let error = outcome.error_message();
        let record = InstallRecord {
            tool_name,
            command: if outcome.command.is_empty() {
                planned_command
            } else {
                &outcome.command
            },
            success: outcome.success,
            version: outcome.version.as_deref(),
            error: error.as_deref(),
        };

        if let Err(e) = memory.record_installation(&record) {
            warn!("Could not record installation of {}: {}", tool_name, e);
        }
    }

    fn report(&mut self, executor: &PlanExecutor<'_>, id: &str) {
        if let Some(step) = executor.plan().step(id) {
            self.ui.on_step_result(step);
        }
        self.ui.on_progress(&executor.progress());
    }
}
