//! Step state machine over an [`InstallationPlan`].
//!
//! ```text
//! Pending -> InProgress -> Completed | Failed
//! Pending -> Skipped
//! Failed -> Retrying -> InProgress      (while retry_count < max_retries)
//! ```
//!
//! The executor only records transitions and keeps the plan counters equal to
//! the status counts. Deciding whether to retry, skip or give up is left to
//! the caller.

use crate::error::{ConfigoError, Result};
use crate::plan::step::{Step, StepStatus};
use crate::plan::InstallationPlan;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub in_progress: usize,
    /// Pending and retrying steps
    pub pending: usize,
    pub percentage: f64,
    pub estimated_remaining_minutes: f64,
}

pub struct PlanExecutor<'a> {
    plan: &'a mut InstallationPlan,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(plan: &'a mut InstallationPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &InstallationPlan {
        self.plan
    }

    /// First pending step, in plan order, whose dependencies have all completed
    pub fn next_step(&self) -> Option<&Step> {
        self.plan
            .steps()
            .iter()
            .find(|step| step.status() == StepStatus::Pending && self.unmet_dependency(step).is_none())
    }

    fn unmet_dependency<'s>(&self, step: &'s Step) -> Option<&'s str> {
        step.dependencies()
            .iter()
            .find(|dep| {
                self.plan
                    .step(dep)
                    .is_some_and(|d| d.status() != StepStatus::Completed)
            })
            .map(String::as_str)
    }

    fn step_mut(&mut self, id: &str) -> Result<&mut Step> {
        self.plan
            .step_mut(id)
            .ok_or_else(|| ConfigoError::StepNotFound(id.to_string()))
    }

    fn expect_status(step: &Step, allowed: &[StepStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&step.status()) {
            Ok(())
        } else {
            Err(ConfigoError::InvalidTransition {
                step: step.id().to_string(),
                from: step.status(),
                action,
            })
        }
    }

    /// Pending/Retrying -> InProgress. A pending step must have its
    /// dependencies completed.
    pub fn start_step(&mut self, id: &str) -> Result<()> {
        let step = self
            .plan
            .step(id)
            .ok_or_else(|| ConfigoError::StepNotFound(id.to_string()))?;
        Self::expect_status(step, &[StepStatus::Pending, StepStatus::Retrying], "start")?;

        if let Some(dep) = self.unmet_dependency(step) {
            return Err(ConfigoError::DependencyIncomplete {
                step: id.to_string(),
                dependency: dep.to_string(),
            });
        }

        let step = self.step_mut(id)?;
        step.status = StepStatus::InProgress;
        step.start_time = Some(Utc::now());
        step.end_time = None;
        info!("Started step: {}", step.name());
        Ok(())
    }

    /// InProgress -> Completed
    pub fn complete_step(&mut self, id: &str, version: Option<String>) -> Result<()> {
        let step = self.step_mut(id)?;
        Self::expect_status(step, &[StepStatus::InProgress], "complete")?;

        step.status = StepStatus::Completed;
        step.end_time = Some(Utc::now());
        step.version = version;
        step.error_message = None;
        info!("Completed step: {}", step.name());

        self.plan.completed_count += 1;
        Ok(())
    }

    /// InProgress -> Failed
    pub fn fail_step(&mut self, id: &str, error: impl Into<String>) -> Result<()> {
        let step = self.step_mut(id)?;
        Self::expect_status(step, &[StepStatus::InProgress], "fail")?;

        let error = error.into();
        warn!("Failed step: {} - {}", step.name(), error);
        step.status = StepStatus::Failed;
        step.end_time = Some(Utc::now());
        step.error_message = Some(error);

        self.plan.failed_count += 1;
        Ok(())
    }

    /// Pending -> Skipped
    pub fn skip_step(&mut self, id: &str, reason: &str) -> Result<()> {
        let step = self.step_mut(id)?;
        Self::expect_status(step, &[StepStatus::Pending], "skip")?;

        info!("Skipped step: {} - {}", step.name(), reason);
        step.status = StepStatus::Skipped;
        step.end_time = Some(Utc::now());
        step.error_message = Some(format!("Skipped: {}", reason));

        self.plan.skipped_count += 1;
        Ok(())
    }

    /// Failed -> Retrying when the step still has retry budget.
    ///
    /// Returns `false` (and leaves the step Failed) once `retry_count` has
    /// reached `max_retries`.
    pub fn retry_step(&mut self, id: &str) -> Result<bool> {
        let step = self.step_mut(id)?;
        Self::expect_status(step, &[StepStatus::Failed], "retry")?;

        if step.retry_count >= step.max_retries() {
            debug!("No retries left for {}", step.name());
            return Ok(false);
        }

        step.retry_count += 1;
        step.status = StepStatus::Retrying;
        step.end_time = None;
        step.error_message = None;
        info!(
            "Retrying step: {} (retry {}/{})",
            step.name(),
            step.retry_count,
            step.max_retries()
        );

        self.plan.failed_count -= 1;
        Ok(true)
    }

    /// Record command attempts made by one execution. Retries consumed inside
    /// the step executor count against the step's retry budget.
    pub fn record_attempts(&mut self, id: &str, attempts: u32, retries: u32) -> Result<()> {
        let step = self.step_mut(id)?;
        step.attempts += attempts;
        step.retry_count = (step.retry_count + retries).min(step.max_retries());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.plan.completed_count + self.plan.failed_count + self.plan.skipped_count
            >= self.plan.total_steps()
    }

    /// True when the plan is complete without any failed step
    pub fn succeeded(&self) -> bool {
        self.is_complete() && self.plan.failed_count == 0
    }

    pub fn progress(&self) -> Progress {
        let total = self.plan.total_steps();
        let completed = self.plan.completed_count;
        let failed = self.plan.failed_count;
        let skipped = self.plan.skipped_count;
        let in_progress = self
            .plan
            .steps()
            .iter()
            .filter(|s| s.status() == StepStatus::InProgress)
            .count();

        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Progress {
            total,
            completed,
            failed,
            skipped,
            in_progress,
            pending: total - completed - failed - skipped - in_progress,
            percentage,
            estimated_remaining_minutes: self.estimate_remaining_minutes(),
        }
    }

    /// Static estimate until something completes, then the observed average
    /// per completed step times the steps not yet completed
    fn estimate_remaining_minutes(&self) -> f64 {
        let completed = self.plan.completed_count;
        if completed == 0 {
            return self.plan.estimated_duration_minutes();
        }

        let elapsed: f64 = self
            .plan
            .steps()
            .iter()
            .filter(|s| s.status() == StepStatus::Completed)
            .filter_map(Step::elapsed_seconds)
            .sum();

        let minutes_per_step = elapsed / completed as f64 / 60.0;
        minutes_per_step * (self.plan.total_steps() - completed) as f64
    }

    pub fn failed_steps(&self) -> Vec<&Step> {
        self.plan
            .steps()
            .iter()
            .filter(|s| s.status() == StepStatus::Failed)
            .collect()
    }

    pub fn retryable_steps(&self) -> Vec<&Step> {
        self.plan
            .steps()
            .iter()
            .filter(|s| s.status() == StepStatus::Failed && s.retry_count() < s.max_retries())
            .collect()
    }

    /// Pending steps that can never become eligible because a dependency
    /// failed or was skipped, directly or through another blocked step
    pub fn blocked_steps(&self) -> Vec<(&Step, &str)> {
        let mut doomed: HashSet<&str> = self
            .plan
            .steps()
            .iter()
            .filter(|s| matches!(s.status(), StepStatus::Failed | StepStatus::Skipped))
            .map(Step::id)
            .collect();

        let mut blocked = Vec::new();
        // Plan order is topological, so one pass sees every dependency first
        for step in self.plan.steps() {
            if step.status() != StepStatus::Pending {
                continue;
            }
            if let Some(dep) = step.dependencies().iter().find(|d| doomed.contains(d.as_str())) {
                blocked.push((step, dep.as_str()));
                doomed.insert(step.id());
            }
        }
        blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanGenerator, Step, StepKind, ToolRequest};
    use std::thread;
    use std::time::Duration;

    fn plan(requests: &[ToolRequest]) -> InstallationPlan {
        PlanGenerator::default().generate(requests, "test", "").unwrap()
    }

    fn assert_counters(plan: &InstallationPlan) {
        let count = |status| plan.steps().iter().filter(|s| s.status() == status).count();
        assert_eq!(plan.completed_count(), count(StepStatus::Completed));
        assert_eq!(plan.failed_count(), count(StepStatus::Failed));
        assert_eq!(plan.skipped_count(), count(StepStatus::Skipped));
        assert!(
            plan.completed_count() + plan.failed_count() + plan.skipped_count()
                <= plan.total_steps()
        );
    }

    #[test]
    fn test_empty_plan_is_complete() {
        let mut plan = plan(&[]);
        let executor = PlanExecutor::new(&mut plan);

        assert!(executor.is_complete());
        assert!(executor.succeeded());
        assert!(executor.next_step().is_none());
        assert_eq!(executor.progress().estimated_remaining_minutes, 0.0);
    }

    #[test]
    fn test_next_step_respects_dependencies() {
        let mut plan = plan(&[
            ToolRequest::tool("Jupyter", "pip install jupyter"),
            ToolRequest::tool("Python", "apt-get install -y python3"),
        ]);
        let mut executor = PlanExecutor::new(&mut plan);

        let mut seen = Vec::new();
        while let Some(step) = executor.next_step() {
            for dep in step.dependencies() {
                assert_eq!(
                    executor.plan().step(dep).unwrap().status(),
                    StepStatus::Completed
                );
            }
            let id = step.id().to_string();
            executor.start_step(&id).unwrap();
            executor.complete_step(&id, None).unwrap();
            assert_counters(executor.plan());
            seen.push(id);
        }

        assert_eq!(seen.len(), 4);
        assert!(seen.iter().position(|s| s == "tool_python") < seen.iter().position(|s| s == "tool_jupyter"));
        assert!(executor.is_complete());
    }

    #[test]
    fn test_start_requires_completed_dependencies() {
        let mut plan = plan(&[ToolRequest::tool("git", "true")]);
        let mut executor = PlanExecutor::new(&mut plan);

        let err = executor.start_step("validate_git").unwrap_err();
        assert!(matches!(err, ConfigoError::DependencyIncomplete { .. }));
    }

    #[test]
    fn test_illegal_transitions() {
        let mut plan = plan(&[ToolRequest::tool("git", "true")]);
        let mut executor = PlanExecutor::new(&mut plan);

        assert!(matches!(
            executor.complete_step("tool_git", None),
            Err(ConfigoError::InvalidTransition { .. })
        ));
        assert!(matches!(
            executor.retry_step("tool_git"),
            Err(ConfigoError::InvalidTransition { .. })
        ));
        assert!(matches!(
            executor.start_step("tool_missing"),
            Err(ConfigoError::StepNotFound(_))
        ));

        executor.start_step("tool_git").unwrap();
        assert!(matches!(
            executor.skip_step("tool_git", "no"),
            Err(ConfigoError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_retry_guard_and_counters() {
        let mut plan = InstallationPlan::new(
            "retry",
            vec![Step::new(StepKind::ToolInstall, "flaky", "false").with_max_retries(2)],
        )
        .unwrap();
        let mut executor = PlanExecutor::new(&mut plan);

        executor.start_step("tool_flaky").unwrap();
        executor.fail_step("tool_flaky", "boom").unwrap();
        assert_eq!(executor.plan().failed_count(), 1);
        assert_eq!(executor.retryable_steps().len(), 1);

        for expected in 1..=2 {
            assert!(executor.retry_step("tool_flaky").unwrap());
            assert_eq!(executor.plan().failed_count(), 0);
            let step = executor.plan().step("tool_flaky").unwrap();
            assert_eq!(step.status(), StepStatus::Retrying);
            assert_eq!(step.retry_count(), expected);
            assert!(step.error_message().is_none());

            executor.start_step("tool_flaky").unwrap();
            executor.fail_step("tool_flaky", "boom").unwrap();
            assert_counters(executor.plan());
        }

        assert!(!executor.retry_step("tool_flaky").unwrap());
        let step = executor.plan().step("tool_flaky").unwrap();
        assert_eq!(step.status(), StepStatus::Failed);
        assert_eq!(step.retry_count(), 2);
        assert!(executor.is_complete());
        assert!(!executor.succeeded());
        assert!(executor.retryable_steps().is_empty());
    }

    #[test]
    fn test_record_attempts_is_bounded() {
        let mut plan = InstallationPlan::new(
            "attempts",
            vec![Step::new(StepKind::ToolInstall, "x", "false").with_max_retries(2)],
        )
        .unwrap();
        let mut executor = PlanExecutor::new(&mut plan);

        executor.record_attempts("tool_x", 4, 3).unwrap();
        let step = executor.plan().step("tool_x").unwrap();
        assert_eq!(step.attempts(), 4);
        assert_eq!(step.retry_count(), 2);
    }

    #[test]
    fn test_skip_and_blocked_steps() {
        let mut plan = plan(&[
            ToolRequest::tool("Python", "false"),
            ToolRequest::tool("Jupyter", "true"),
        ]);
        let mut executor = PlanExecutor::new(&mut plan);

        executor.start_step("tool_python").unwrap();
        executor.fail_step("tool_python", "nope").unwrap();
        assert!(executor.next_step().is_none());
        assert!(!executor.is_complete());

        let blocked: Vec<(String, String)> = executor
            .blocked_steps()
            .into_iter()
            .map(|(s, d)| (s.id().to_string(), d.to_string()))
            .collect();
        assert!(blocked.contains(&("tool_jupyter".into(), "tool_python".into())));
        assert!(blocked.contains(&("validate_python".into(), "tool_python".into())));
        assert!(blocked.contains(&("validate_jupyter".into(), "tool_jupyter".into())));

        for (id, dep) in blocked {
            executor
                .skip_step(&id, &format!("dependency '{}' did not complete", dep))
                .unwrap();
        }
        assert!(executor.is_complete());
        assert_counters(executor.plan());
        assert_eq!(executor.plan().skipped_count(), 3);
    }

    #[test]
    fn test_progress_recalibrates_after_first_completion() {
        let mut plan = plan(&[
            ToolRequest::tool("a", "true"),
            ToolRequest::tool("b", "true"),
        ]);
        let static_estimate = plan.estimated_duration_minutes();
        let mut executor = PlanExecutor::new(&mut plan);

        let before = executor.progress();
        assert_eq!(before.estimated_remaining_minutes, static_estimate);
        assert_eq!(before.pending, 4);
        assert_eq!(before.percentage, 0.0);

        executor.start_step("tool_a").unwrap();
        assert_eq!(executor.progress().in_progress, 1);
        thread::sleep(Duration::from_millis(50));
        executor.complete_step("tool_a", Some("a 1.0".into())).unwrap();

        let after = executor.progress();
        assert_eq!(after.completed, 1);
        assert_eq!(after.percentage, 25.0);
        assert!(after.estimated_remaining_minutes > 0.0);
        assert!(after.estimated_remaining_minutes < static_estimate);

        let step = executor.plan().step("tool_a").unwrap();
        let expected = step.elapsed_seconds().unwrap() / 60.0 * 3.0;
        assert!((after.estimated_remaining_minutes - expected).abs() < 1e-9);
    }
}
