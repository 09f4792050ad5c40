//! Installation planning: step model, static catalog, dependency resolution
//! and plan generation.

pub mod catalog;
pub mod generator;
pub mod resolver;
pub mod session;
pub mod step;

pub use generator::{
    Complexity, GeneratorSettings, InstallationPlan, PlanGenerator, PlanReview, PlanSummary,
    ToolRequest,
};
pub use session::{PackageManager, PlannerSession};
pub use step::{Step, StepKind, StepStatus};
