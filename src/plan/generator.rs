//! Builds dependency-ordered installation plans from requested tools.

use super::catalog;
use super::resolver;
use super::step::{step_id, Step, StepKind, StepStatus, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Retry budgets for the non-tool kinds
const EXTENSION_MAX_RETRIES: u32 = 2;
const PORTAL_MAX_RETRIES: u32 = 1;
const VALIDATION_MAX_RETRIES: u32 = 1;

/// Command used to list installed editor extensions
pub const EXTENSION_LIST_COMMAND: &str = "code --list-extensions";

/// Plans estimated above this many minutes get a review suggestion
const LONG_PLAN_MINUTES: f64 = 30.0;

/// One installable thing a caller asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub install_command: String,
    #[serde(default)]
    pub check_command: Option<String>,
    #[serde(default)]
    pub is_extension: bool,
    #[serde(default)]
    pub extension_id: Option<String>,
    #[serde(default)]
    pub portal_url: Option<String>,
    /// Names of tools that must be installed first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-attempt timeout; the generator's setting applies when unset
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

impl ToolRequest {
    pub fn tool(name: impl Into<String>, install_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            install_command: install_command.into(),
            ..Default::default()
        }
    }

    pub fn extension(name: impl Into<String>, extension_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_extension: true,
            extension_id: Some(extension_id.into()),
            ..Default::default()
        }
    }

    pub fn portal(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            portal_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_check_command(mut self, check_command: impl Into<String>) -> Self {
        self.check_command = Some(check_command.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    fn dependency_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.dependencies
            .iter()
            .map(|name| step_id(StepKind::ToolInstall, name))
    }

    /// Install kind requested; never `Validation`
    fn kind(&self) -> StepKind {
        if self.is_extension {
            StepKind::ExtensionInstall
        } else if self.portal_url.is_some() {
            StepKind::LoginPortal
        } else {
            StepKind::ToolInstall
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Classify by step count, extension count and total dependency edges
    pub fn classify(steps: usize, extensions: usize, dependencies: usize) -> Self {
        if steps <= 3 && extensions <= 1 && dependencies <= 2 {
            Complexity::Low
        } else if steps <= 8 && extensions <= 3 && dependencies <= 5 {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        };
        f.write_str(s)
    }
}

/// An ordered, dependency-resolved collection of steps for one environment.
///
/// Steps are never removed. The completed/failed/skipped counters are kept in
/// step with step statuses by the plan executor.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationPlan {
    id: String,
    environment: String,
    steps: Vec<Step>,
    created_at: DateTime<Utc>,
    estimated_duration_minutes: f64,
    complexity: Complexity,
    #[serde(skip)]
    duplicates: Vec<String>,
    pub(crate) completed_count: usize,
    pub(crate) failed_count: usize,
    pub(crate) skipped_count: usize,
}

impl InstallationPlan {
    /// Link dependencies, order steps topologically and compute the estimates.
    ///
    /// Steps with an id already present are dropped (first one wins). Fails
    /// with a cycle error when the dependency graph is not a DAG.
    pub fn new(environment: impl Into<String>, steps: Vec<Step>) -> Result<Self> {
        let environment = environment.into();

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut steps: Vec<Step> = steps
            .into_iter()
            .filter(|step| {
                if seen.insert(step.id().to_string()) {
                    true
                } else {
                    warn!("Dropping duplicate step '{}'", step.id());
                    duplicates.push(step.id().to_string());
                    false
                }
            })
            .collect();

        resolver::link(&mut steps);
        let order = resolver::resolve(&steps)?;

        let mut by_id: HashMap<String, Step> = steps
            .into_iter()
            .map(|step| (step.id().to_string(), step))
            .collect();
        let steps: Vec<Step> = order.iter().filter_map(|id| by_id.remove(id)).collect();

        let estimated_duration_minutes: f64 = steps.iter().map(|s| s.kind().estimated_minutes()).sum();
        let extensions = steps
            .iter()
            .filter(|s| s.kind() == StepKind::ExtensionInstall)
            .count();
        let edges: usize = steps.iter().map(|s| s.dependencies().len()).sum();
        let complexity = Complexity::classify(steps.len(), extensions, edges);

        let count = |status: StepStatus| steps.iter().filter(|s| s.status() == status).count();
        let completed_count = count(StepStatus::Completed);
        let failed_count = count(StepStatus::Failed);
        let skipped_count = count(StepStatus::Skipped);

        let created_at = Utc::now();
        let digest = md5::compute(environment.as_bytes());
        let hash = format!("{:x}", digest);
        let id = format!("plan_{}_{}", created_at.format("%Y%m%d_%H%M%S"), &hash[..8]);

        Ok(Self {
            id,
            environment,
            steps,
            created_at,
            estimated_duration_minutes,
            complexity,
            duplicates,
            completed_count,
            failed_count,
            skipped_count,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub(crate) fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id() == id)
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn estimated_duration_minutes(&self) -> f64 {
        self.estimated_duration_minutes
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    pub fn failed_count(&self) -> usize {
        self.failed_count
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    /// Static sanity checks before anything runs
    pub fn review(&self) -> PlanReview {
        let mut review = PlanReview::default();

        for step in &self.steps {
            if step.kind() == StepKind::ToolInstall && step.command().trim().is_empty() {
                review
                    .errors
                    .push(format!("Missing installation command for {}", step.tool_name()));
            }
        }

        if !self.duplicates.is_empty() {
            review.warnings.push(format!(
                "Duplicate tool installations detected in plan: {}",
                self.duplicates.join(", ")
            ));
        }

        if self.estimated_duration_minutes > LONG_PLAN_MINUTES {
            review.suggestions.push(format!(
                "Estimated duration is {:.1} minutes; consider installing fewer tools at once",
                self.estimated_duration_minutes
            ));
        }

        if self.complexity == Complexity::High {
            review
                .suggestions
                .push("Consider breaking this into smaller, focused installations".to_string());
        }

        review.valid = review.errors.is_empty();
        review
    }

    pub fn summary(&self) -> PlanSummary {
        let mut kinds = KindCounts::default();
        for step in &self.steps {
            match step.kind() {
                StepKind::ToolInstall => kinds.tools += 1,
                StepKind::ExtensionInstall => kinds.extensions += 1,
                StepKind::LoginPortal => kinds.portals += 1,
                StepKind::Validation => kinds.validations += 1,
            }
        }

        let dependencies: BTreeSet<String> = self
            .steps
            .iter()
            .flat_map(|s| s.dependencies().iter().cloned())
            .collect();

        PlanSummary {
            id: self.id.clone(),
            environment: self.environment.clone(),
            total_steps: self.steps.len(),
            kinds,
            dependencies: dependencies.into_iter().collect(),
            estimated_duration_minutes: self.estimated_duration_minutes,
            complexity: self.complexity,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanReview {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub tools: usize,
    pub extensions: usize,
    pub portals: usize,
    pub validations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub id: String,
    pub environment: String,
    pub total_steps: usize,
    pub kinds: KindCounts,
    pub dependencies: Vec<String>,
    pub estimated_duration_minutes: f64,
    pub complexity: Complexity,
    pub created_at: DateTime<Utc>,
}

/// Limits applied to generated steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub validation_timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            validation_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanGenerator {
    settings: GeneratorSettings,
}

impl PlanGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self { settings }
    }

    /// Build a plan for `requests`.
    ///
    /// `memory_context` is free text describing past outcomes; it only nudges
    /// confidence scores. An empty request list yields an empty plan.
    pub fn generate(
        &self,
        requests: &[ToolRequest],
        environment: &str,
        memory_context: &str,
    ) -> Result<InstallationPlan> {
        let (mut base, mut extensions, mut portals) = (Vec::new(), Vec::new(), Vec::new());
        for request in requests {
            match request.kind() {
                StepKind::ExtensionInstall => {
                    extensions.push(self.extension_step(request, memory_context))
                }
                StepKind::LoginPortal => portals.push(self.portal_step(request)),
                _ => base.push(self.tool_step(request, memory_context)),
            }
        }

        let validations: Vec<Step> = base
            .iter()
            .map(|step| {
                Step::validation_of(step, step.check_command())
                    .with_timeout_secs(self.settings.validation_timeout_secs)
                    .with_max_retries(VALIDATION_MAX_RETRIES)
            })
            .chain(extensions.iter().map(|step| {
                Step::validation_of(step, EXTENSION_LIST_COMMAND)
                    .with_confidence(0.9)
                    .with_timeout_secs(self.settings.validation_timeout_secs)
                    .with_max_retries(VALIDATION_MAX_RETRIES)
            }))
            .collect();

        debug!(
            "Partitioned {} requests: {} tools, {} extensions, {} portals",
            requests.len(),
            base.len(),
            extensions.len(),
            portals.len()
        );

        let steps = base
            .into_iter()
            .chain(extensions)
            .chain(portals)
            .chain(validations)
            .collect();

        let plan = InstallationPlan::new(environment, steps)?;
        info!(
            "Generated plan {} with {} steps ({} complexity, ~{:.1} min)",
            plan.id(),
            plan.total_steps(),
            plan.complexity(),
            plan.estimated_duration_minutes()
        );
        Ok(plan)
    }

    fn tool_step(&self, request: &ToolRequest, memory_context: &str) -> Step {
        let mut step = Step::new(
            StepKind::ToolInstall,
            request.name.clone(),
            request.install_command.clone(),
        )
        .with_justification(catalog::justification(&request.name))
        .with_confidence(adjusted_confidence(&request.name, memory_context))
        .with_dependencies(request.dependency_ids())
        .with_timeout_secs(request.timeout_secs.unwrap_or(self.settings.timeout_secs))
        .with_max_retries(self.settings.max_retries);

        if let Some(check) = &request.check_command {
            step = step.with_check_command(check.clone());
        }
        step
    }

    fn extension_step(&self, request: &ToolRequest, memory_context: &str) -> Step {
        let mut step = Step::new(
            StepKind::ExtensionInstall,
            request.name.clone(),
            request.install_command.clone(),
        )
        .with_justification(catalog::justification(&request.name))
        .with_confidence(adjusted_confidence(&request.name, memory_context))
        .with_check_command(
            request
                .check_command
                .clone()
                .unwrap_or_else(|| EXTENSION_LIST_COMMAND.to_string()),
        )
        .with_dependencies(request.dependency_ids())
        .with_timeout_secs(request.timeout_secs.unwrap_or(self.settings.timeout_secs))
        .with_max_retries(EXTENSION_MAX_RETRIES);

        if let Some(id) = &request.extension_id {
            step = step.with_extension_id(id.clone());
        }
        step
    }

    fn portal_step(&self, request: &ToolRequest) -> Step {
        let mut step = Step::new(
            StepKind::LoginPortal,
            request.name.clone(),
            request.install_command.clone(),
        )
        .with_justification(format!(
            "Login to {} for development services",
            request.name
        ))
        .with_confidence(catalog::PORTAL_CONFIDENCE)
        .with_timeout_secs(self.settings.validation_timeout_secs)
        .with_max_retries(PORTAL_MAX_RETRIES);

        if let Some(url) = &request.portal_url {
            step = step.with_portal_url(url.clone());
        }
        step
    }
}

/// Base confidence nudged by prose memory: 0.8x when the tool is mentioned
/// alongside "failed", 1.1x alongside "successfully installed", capped at 1.0.
pub fn adjusted_confidence(name: &str, memory_context: &str) -> f64 {
    let mut confidence = catalog::base_confidence(name);
    let context = memory_context.to_lowercase();
    let mentioned = context.contains(&name.to_lowercase());

    if mentioned && context.contains("failed") {
        confidence *= 0.8;
    }
    if mentioned && context.contains("successfully installed") {
        confidence *= 1.1;
    }

    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigoError;

    fn ids(plan: &InstallationPlan) -> Vec<&str> {
        plan.steps().iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_empty_request_list() {
        let plan = PlanGenerator::default().generate(&[], "nothing", "").unwrap();

        assert_eq!(plan.total_steps(), 0);
        assert_eq!(plan.estimated_duration_minutes(), 0.0);
        assert_eq!(plan.complexity(), Complexity::Low);
    }

    #[test]
    fn test_validation_step_per_tool_and_extension() {
        let requests = vec![
            ToolRequest::tool("VS Code", "snap install code --classic"),
            ToolRequest::extension("YAML Extension", "redhat.vscode-yaml"),
            ToolRequest::portal("GitHub", "https://github.com/login"),
        ];
        let plan = PlanGenerator::default().generate(&requests, "editor", "").unwrap();

        assert_eq!(plan.total_steps(), 5);
        let order = ids(&plan);
        let pos = |id: &str| order.iter().position(|s| *s == id).unwrap();
        assert!(pos("tool_vs_code") < pos("ext_yaml_extension"));
        assert!(pos("tool_vs_code") < pos("validate_vs_code"));
        assert!(pos("ext_yaml_extension") < pos("validate_ext_yaml_extension"));
        assert!(plan.step("validate_portal_github").is_none());

        // 3 + 1 + 2 + 0.5 + 0.5
        assert_eq!(plan.estimated_duration_minutes(), 7.0);
    }

    #[test]
    fn test_per_kind_retry_budgets() {
        let requests = vec![
            ToolRequest::tool("git", "apt-get install -y git"),
            ToolRequest::extension("REST Client", "humao.rest-client"),
            ToolRequest::portal("GitHub", "https://github.com/login"),
        ];
        let settings = GeneratorSettings {
            max_retries: 5,
            ..Default::default()
        };
        let plan = PlanGenerator::new(settings).generate(&requests, "", "").unwrap();

        assert_eq!(plan.step("tool_git").unwrap().max_retries(), 5);
        assert_eq!(plan.step("ext_rest_client").unwrap().max_retries(), 2);
        assert_eq!(plan.step("portal_github").unwrap().max_retries(), 1);
        assert_eq!(plan.step("validate_git").unwrap().max_retries(), 1);
    }

    #[test]
    fn test_request_timeout_overrides_default() {
        let requests = vec![
            ToolRequest::tool("git", "apt-get install -y git").with_timeout_secs(45),
            ToolRequest::tool("curl", "apt-get install -y curl"),
        ];
        let plan = PlanGenerator::default().generate(&requests, "", "").unwrap();

        assert_eq!(plan.step("tool_git").unwrap().timeout_secs(), 45);
        assert_eq!(plan.step("tool_curl").unwrap().timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_self_dependency_fails_generation() {
        let mut request = ToolRequest::tool("git", "true");
        request.dependencies = vec!["git".to_string()];

        let result = PlanGenerator::default().generate(&[request], "", "");
        assert!(matches!(result, Err(ConfigoError::Cycle { .. })));
    }

    #[test]
    fn test_confidence_nudges() {
        assert_eq!(adjusted_confidence("Git", ""), 0.95);
        assert_eq!(adjusted_confidence("Git", "Successfully installed tools: git"), 1.0);

        let failed = adjusted_confidence("Docker", "Previously failed tools: docker");
        assert!((failed - 0.68).abs() < 1e-9);

        let unrelated = adjusted_confidence("Docker", "Previously failed tools: git");
        assert_eq!(unrelated, 0.85);

        assert_eq!(adjusted_confidence("ripgrep", ""), 0.7);
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(Complexity::classify(3, 1, 2), Complexity::Low);
        assert_eq!(Complexity::classify(4, 0, 0), Complexity::Medium);
        assert_eq!(Complexity::classify(8, 3, 5), Complexity::Medium);
        assert_eq!(Complexity::classify(8, 4, 0), Complexity::High);
        assert_eq!(Complexity::classify(9, 0, 0), Complexity::High);
    }

    #[test]
    fn test_duplicate_requests_are_reported() {
        let requests = vec![
            ToolRequest::tool("git", "apt-get install -y git"),
            ToolRequest::tool("Git", "apt-get install -y git"),
        ];
        let plan = PlanGenerator::default().generate(&requests, "", "").unwrap();

        assert_eq!(plan.total_steps(), 2);
        let review = plan.review();
        assert!(review.valid);
        assert_eq!(review.warnings.len(), 1);
    }

    #[test]
    fn test_review_flags_missing_command() {
        let plan = PlanGenerator::default()
            .generate(&[ToolRequest::tool("git", "  ")], "", "")
            .unwrap();
        let review = plan.review();

        assert!(!review.valid);
        assert_eq!(review.errors, vec!["Missing installation command for git"]);
    }

    #[test]
    fn test_summary_counts() {
        let requests = vec![
            ToolRequest::tool("Python", "apt-get install -y python3"),
            ToolRequest::tool("Jupyter", "pip install jupyter"),
        ];
        let plan = PlanGenerator::default().generate(&requests, "data", "").unwrap();
        let summary = plan.summary();

        assert_eq!(summary.kinds.tools, 2);
        assert_eq!(summary.kinds.validations, 2);
        assert!(summary.dependencies.contains(&"tool_python".to_string()));
        assert_eq!(summary.total_steps, 4);
        assert!(plan.id().starts_with("plan_"));
    }
}
