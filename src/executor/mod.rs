//! Running plans: shell processes, single steps, and whole plans.

pub mod installer;
pub mod plan_executor;
pub mod process;
pub mod step_executor;

pub use installer::{InstallReport, Installer, StepReport};
pub use plan_executor::{PlanExecutor, Progress};
pub use step_executor::{ExecutionOutcome, Failure, RetryPolicy, StepExecutor};
