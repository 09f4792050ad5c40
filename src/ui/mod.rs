//! User-facing progress reporting and confirmation.

use crate::executor::plan_executor::Progress;
use crate::plan::step::{Step, StepStatus};
use crate::plan::InstallationPlan;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};

/// Receives progress from the installer. Only ever called, never calls back.
pub trait Ui {
    fn on_plan_start(&mut self, _plan: &InstallationPlan) {}

    fn on_step_start(&mut self, step: &Step);

    /// Called after the step reached its new status
    fn on_step_result(&mut self, step: &Step);

    fn on_progress(&mut self, progress: &Progress);

    fn on_plan_finish(&mut self) {}

    fn confirm(&mut self, message: &str) -> bool;
}

/// One result line for a finished step
pub fn result_line(step: &Step) -> String {
    match step.status() {
        StepStatus::Completed => match step.version() {
            Some(version) => format!("✓ {} ({})", step.name(), version),
            None => format!("✓ {}", step.name()),
        },
        StepStatus::Failed => format!(
            "✗ {}: {} ({} attempt{})",
            step.name(),
            step.error_message().unwrap_or("failed"),
            step.attempts(),
            if step.attempts() == 1 { "" } else { "s" }
        ),
        StepStatus::Skipped => format!(
            "⊘ {}: {}",
            step.name(),
            step.error_message().unwrap_or("Skipped")
        ),
        other => format!("· {}: {}", step.name(), other),
    }
}

/// Terminal UI with a progress bar
pub struct ConsoleUi {
    bar: Option<ProgressBar>,
    assume_yes: bool,
}

impl ConsoleUi {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            bar: None,
            assume_yes,
        }
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => println!("{}", line),
        }
    }
}

impl Ui for ConsoleUi {
    fn on_plan_start(&mut self, plan: &InstallationPlan) {
        println!(
            "Installing {} steps (~{:.1} min, {} complexity)",
            plan.total_steps(),
            plan.estimated_duration_minutes(),
            plan.complexity()
        );

        let bar = ProgressBar::new(plan.total_steps() as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        self.bar = Some(bar);
    }

    fn on_step_start(&mut self, step: &Step) {
        match &self.bar {
            Some(bar) => bar.set_message(step.name().to_string()),
            None => println!("→ {}", step.name()),
        }
    }

    fn on_step_result(&mut self, step: &Step) {
        self.println(&result_line(step));
    }

    fn on_progress(&mut self, progress: &Progress) {
        if let Some(bar) = &self.bar {
            bar.set_position((progress.completed + progress.failed + progress.skipped) as u64);
        }
    }

    fn on_plan_finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{} [Y/n]: ", message);
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input).is_err() {
            return false;
        }
        let input = input.trim().to_lowercase();
        input.is_empty() || input == "y" || input == "yes"
    }
}

/// UI that shows nothing and accepts every confirmation
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentUi;

impl Ui for SilentUi {
    fn on_step_start(&mut self, _step: &Step) {}

    fn on_step_result(&mut self, _step: &Step) {}

    fn on_progress(&mut self, _progress: &Progress) {}

    fn confirm(&mut self, _message: &str) -> bool {
        true
    }
}
