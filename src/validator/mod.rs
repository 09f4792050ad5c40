//! Post-install probes and failure diagnosis.

use crate::executor::process;
use crate::utils::shell::escape;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Named probes per known tool, keyed by every accepted spelling
const PROBES: &[(&[&str], &[(&str, &str)])] = &[
    (
        &["python", "python3"],
        &[
            ("python_version", "python3 --version"),
            ("pip_available", "pip3 --version"),
        ],
    ),
    (
        &["node", "node.js", "nodejs"],
        &[
            ("node_version", "node --version"),
            ("npm_available", "npm --version"),
        ],
    ),
    (
        &["git"],
        &[
            ("git_version", "git --version"),
            ("git_config", "git config --list"),
        ],
    ),
    (
        &["docker"],
        &[
            ("docker_version", "docker --version"),
            ("docker_running", "docker ps"),
        ],
    ),
    (&["vscode", "vs code", "code"], &[("code_version", "code --version")]),
    (
        &["java", "openjdk"],
        &[
            ("java_version", "java -version"),
            ("javac_available", "javac -version"),
        ],
    ),
    (&["gcc"], &[("gcc_version", "gcc --version")]),
    (&["make"], &[("make_version", "make --version")]),
];

/// Host checks run by `validate_system`
const SYSTEM_PROBES: &[(&str, &str)] = &[
    ("disk_space", "df -h ."),
    ("memory_usage", "free -h"),
    ("network_connectivity", "ping -c 1 8.8.8.8"),
    ("sudo_privileges", "sudo -n true"),
];

/// Baseline tooling checked by `validate_environment`
const ENVIRONMENT_PROBES: &[(&str, &str)] = &[
    ("python_environment", "python3 --version"),
    ("git_environment", "git --version"),
    (
        "package_manager",
        "which apt-get || which dnf || which yum || which pacman || which brew",
    ),
];

/// Ordered (substring, suggestions) pairs; the first match wins.
/// `{tool}` is replaced with the tool name.
const DIAGNOSIS_RULES: &[(&str, &[&str])] = &[
    (
        "command not found",
        &[
            "Install {tool} using your package manager",
            "Check if {tool} is in your PATH",
        ],
    ),
    (
        "permission denied",
        &["Run the command with sudo privileges", "Check file permissions"],
    ),
    (
        "timeout",
        &[
            "Check system resources (CPU, memory, disk)",
            "Verify network connectivity",
        ],
    ),
    (
        "timed out",
        &[
            "Check system resources (CPU, memory, disk)",
            "Verify network connectivity",
        ],
    ),
];

const VERSION_PROBE_SUGGESTIONS: &[&str] = &[
    "Update {tool} to a newer version",
    "Check if the tool is properly installed",
];

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Check the tool installation",
    "Verify system requirements",
    "Check for conflicting installations",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub tool_name: String,
    pub probe_name: String,
    pub passed: bool,
    pub output: String,
    pub error_message: Option<String>,
    pub execution_time_seconds: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub probe_name: String,
    pub error_message: String,
    pub suggestions: Vec<String>,
}

/// All probes of one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub tool_name: String,
    pub passed: bool,
    pub results: Vec<ValidationResult>,
    /// One entry per failed probe
    pub diagnoses: Vec<Diagnosis>,
}

/// Probe counts across several validated tools
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub total_probes: usize,
    pub passed_probes: usize,
    pub failed_probes: usize,
    /// Passed over total; 0 when nothing ran
    pub success_rate: f64,
    /// Share of passing probes per tool, in validation order
    pub tool_success_rates: Vec<(String, f64)>,
    /// Tools with at least one failed probe
    pub failed_tools: Vec<String>,
}

impl ValidationSummary {
    pub fn from_results(results: &[AggregateResult]) -> Self {
        let mut per_tool: Vec<(String, usize, usize)> = Vec::new();
        for result in results.iter().flat_map(|r| &r.results) {
            let index = match per_tool.iter().position(|(name, _, _)| *name == result.tool_name) {
                Some(index) => index,
                None => {
                    per_tool.push((result.tool_name.clone(), 0, 0));
                    per_tool.len() - 1
                }
            };
            let entry = &mut per_tool[index];
            entry.2 += 1;
            if result.passed {
                entry.1 += 1;
            }
        }

        let total_probes: usize = per_tool.iter().map(|(_, _, total)| total).sum();
        let passed_probes: usize = per_tool.iter().map(|(_, passed, _)| passed).sum();
        let tool_success_rates: Vec<(String, f64)> = per_tool
            .into_iter()
            .map(|(name, passed, total)| (name, rate(passed, total)))
            .collect();
        let failed_tools = tool_success_rates
            .iter()
            .filter(|(_, rate)| *rate < 1.0)
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            total_probes,
            passed_probes,
            failed_probes: total_probes - passed_probes,
            success_rate: rate(passed_probes, total_probes),
            tool_success_rates,
            failed_tools,
        }
    }
}

fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    timeout: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }
}

impl Validator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probes for `tool_name`: the predefined ones, or `<name> --version`
    pub fn probes_for(tool_name: &str) -> Vec<(String, String)> {
        let key = tool_name.trim().to_lowercase();
        match PROBES.iter().find(|(names, _)| names.contains(&key.as_str())) {
            Some((_, probes)) => owned(probes),
            None => vec![(
                format!("{}_version", key.replace(' ', "_")),
                format!("{} --version", escape(&key)),
            )],
        }
    }

    pub fn validate(&self, tool_name: &str) -> AggregateResult {
        self.run_probes(tool_name, &Self::probes_for(tool_name))
    }

    /// Disk, memory, network and sudo checks, reported as the `system` tool
    pub fn validate_system(&self) -> AggregateResult {
        self.run_probes("system", &owned(SYSTEM_PROBES))
    }

    /// Python, git and package manager checks, reported as the `environment` tool
    pub fn validate_environment(&self) -> AggregateResult {
        self.run_probes("environment", &owned(ENVIRONMENT_PROBES))
    }

    fn run_probes(&self, tool_name: &str, probes: &[(String, String)]) -> AggregateResult {
        let results: Vec<ValidationResult> = probes
            .iter()
            .map(|(probe, command)| self.run_probe(tool_name, probe, command))
            .collect();

        let diagnoses: Vec<Diagnosis> = results
            .iter()
            .filter(|r| !r.passed)
            .map(diagnose)
            .collect();
        let passed = diagnoses.is_empty();

        if passed {
            info!("{} validated ({} probes)", tool_name, results.len());
        } else {
            warn!("{} failed {} of {} probes", tool_name, diagnoses.len(), results.len());
        }

        AggregateResult {
            tool_name: tool_name.to_string(),
            passed,
            results,
            diagnoses,
        }
    }

    pub fn validate_all<S: AsRef<str>>(&self, tools: &[S]) -> Vec<AggregateResult> {
        tools.iter().map(|t| self.validate(t.as_ref())).collect()
    }

    fn run_probe(&self, tool_name: &str, probe: &str, command: &str) -> ValidationResult {
        debug!("Probe {}: {}", probe, command);

        let (passed, output, error_message, elapsed) = match process::run_shell(command, self.timeout) {
            Ok(out) if out.timed_out => (
                false,
                out.stdout.trim().to_string(),
                Some(format!("Probe timed out after {} seconds", self.timeout.as_secs())),
                out.elapsed,
            ),
            Ok(out) if out.success() => (true, out.stdout.trim().to_string(), None, out.elapsed),
            Ok(out) => {
                let error = if out.stderr.trim().is_empty() && out.stdout.trim().is_empty() {
                    "Unknown error".to_string()
                } else {
                    out.error_text()
                };
                (false, out.stdout.trim().to_string(), Some(error), out.elapsed)
            }
            Err(e) => (false, String::new(), Some(e.to_string()), Duration::ZERO),
        };

        ValidationResult {
            tool_name: tool_name.to_string(),
            probe_name: probe.to_string(),
            passed,
            output,
            error_message,
            execution_time_seconds: elapsed.as_secs_f64(),
            severity: if passed { Severity::Info } else { Severity::Error },
        }
    }
}

fn owned(probes: &[(&str, &str)]) -> Vec<(String, String)> {
    probes
        .iter()
        .map(|(name, cmd)| (name.to_string(), cmd.to_string()))
        .collect()
}

/// Map a failed probe to canned suggestions
pub fn diagnose(result: &ValidationResult) -> Diagnosis {
    let error = result.error_message.clone().unwrap_or_default();
    let lowered = error.to_lowercase();

    let templates = DIAGNOSIS_RULES
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, suggestions)| *suggestions)
        .unwrap_or_else(|| {
            if result.probe_name.to_lowercase().contains("version") {
                VERSION_PROBE_SUGGESTIONS
            } else {
                GENERIC_SUGGESTIONS
            }
        });

    Diagnosis {
        probe_name: result.probe_name.clone(),
        error_message: error,
        suggestions: templates
            .iter()
            .map(|s| s.replace("{tool}", &result.tool_name))
            .collect(),
    }
}
