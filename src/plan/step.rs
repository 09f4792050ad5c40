//! Installable units of work and their lifecycle status.
//!
//! A [`Step`] is created once by the plan generator. Its descriptive fields are
//! fixed at construction; its lifecycle fields (status, retry counter,
//! timestamps, error, version) are only changed by the plan executor's
//! transition methods.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Automatic retry bound for a step unless the generator says otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wall-clock limit for one command attempt, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// What a step installs or checks. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolInstall,
    ExtensionInstall,
    LoginPortal,
    Validation,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ToolInstall => "tool_install",
            StepKind::ExtensionInstall => "extension_install",
            StepKind::LoginPortal => "login_portal",
            StepKind::Validation => "validation",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            StepKind::ToolInstall => "tool",
            StepKind::ExtensionInstall => "ext",
            StepKind::LoginPortal => "portal",
            StepKind::Validation => "validate",
        }
    }

    /// Duration heuristic used for the plan's static estimate
    pub fn estimated_minutes(&self) -> f64 {
        match self {
            StepKind::ToolInstall => 3.0,
            StepKind::ExtensionInstall => 1.0,
            StepKind::LoginPortal => 2.0,
            StepKind::Validation => 0.5,
        }
    }

    /// True for kinds that change the machine (and may already be satisfied)
    pub fn is_install(&self) -> bool {
        matches!(self, StepKind::ToolInstall | StepKind::ExtensionInstall)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Retrying => "retrying",
        }
    }

    /// Completed, Failed and Skipped are counted towards plan completion
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a display name into an id fragment: lowercase, spaces become `_`
pub fn slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Stable step id derived from kind and name
pub fn step_id(kind: StepKind, name: &str) -> String {
    format!("{}_{}", kind.id_prefix(), slug(name))
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    id: String,
    name: String,
    kind: StepKind,
    tool_name: String,
    description: String,
    justification: String,
    command: String,
    check_command: String,
    extension_id: Option<String>,
    portal_url: Option<String>,
    validates: Option<String>,
    pub(crate) dependencies: BTreeSet<String>,
    confidence: f64,
    timeout_secs: u64,
    max_retries: u32,

    pub(crate) status: StepStatus,
    pub(crate) retry_count: u32,
    pub(crate) attempts: u32,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) error_message: Option<String>,
    pub(crate) version: Option<String>,
}

impl Step {
    /// Create a pending step for `name`; the id is derived from kind and name.
    pub fn new(kind: StepKind, name: impl Into<String>, command: impl Into<String>) -> Self {
        let name = name.into();
        let description = match kind {
            StepKind::ToolInstall => format!("Install {}", name),
            StepKind::ExtensionInstall => format!("Install {} extension", name),
            StepKind::LoginPortal => format!("Login to {}", name),
            StepKind::Validation => format!("Verify {}", name),
        };

        Self {
            id: step_id(kind, &name),
            tool_name: name.clone(),
            name,
            kind,
            description,
            justification: String::new(),
            command: command.into(),
            check_command: String::new(),
            extension_id: None,
            portal_url: None,
            validates: None,
            dependencies: BTreeSet::new(),
            confidence: 0.8,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            status: StepStatus::Pending,
            retry_count: 0,
            attempts: 0,
            start_time: None,
            end_time: None,
            error_message: None,
            version: None,
        }
    }

    /// Validation step for an install step. Depends structurally on `target`.
    pub fn validation_of(target: &Step, check_command: impl Into<String>) -> Self {
        let id = match target.kind {
            StepKind::ExtensionInstall => format!("validate_ext_{}", slug(&target.name)),
            _ => step_id(StepKind::Validation, &target.name),
        };

        let mut step = Step::new(
            StepKind::Validation,
            format!("Validate {}", target.name),
            "",
        );
        step.id = id;
        step.tool_name = target.tool_name.clone();
        step.description = format!("Verify {} installation", target.name);
        step.justification = format!(
            "Ensure {} is properly installed and functional",
            target.name
        );
        step.check_command = check_command.into();
        step.extension_id = target.extension_id.clone();
        step.validates = Some(target.id.clone());
        step.max_retries = 1;
        step.confidence = 0.95;
        step
    }

    pub fn with_check_command(mut self, check_command: impl Into<String>) -> Self {
        self.check_command = check_command.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn with_extension_id(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = Some(extension_id.into());
        self
    }

    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = Some(url.into());
        self
    }

    /// Explicit dependency edges, by step id
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Tool this step concerns (for validation steps, the validated tool)
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn check_command(&self) -> &str {
        &self.check_command
    }

    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.as_deref()
    }

    pub fn portal_url(&self) -> Option<&str> {
        self.portal_url.as_deref()
    }

    /// Id of the install step a validation step verifies
    pub fn validates(&self) -> Option<&str> {
        self.validates.as_deref()
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Command attempts recorded so far, across all retries
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Seconds between start and end, when both are stamped
    pub fn elapsed_seconds(&self) -> Option<f64> {
        let (start, end) = (self.start_time?, self.end_time?);
        Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
    }
}
