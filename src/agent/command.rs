use super::{Agent, RepairRequest};
use crate::error::{ConfigoError, Result};
use crate::executor::process;
use std::time::Duration;
use tracing::{debug, warn};

/// Agent backed by an external command.
///
/// The prompt is written to the command's stdin and the answer read from its
/// stdout. The command runs through `bash -c`, so it may contain arguments.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: String,
    timeout: Duration,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        debug!("Asking '{}' ({} byte prompt)", self.command, prompt.len());
        let output = process::run_shell_with_input(&self.command, Some(prompt.as_bytes()), self.timeout)?;

        if output.timed_out {
            return Err(ConfigoError::Agent(format!(
                "'{}' timed out after {}s",
                self.command,
                self.timeout.as_secs()
            )));
        }
        if !output.success() {
            return Err(ConfigoError::Agent(format!(
                "'{}' failed: {}",
                self.command,
                output.error_text()
            )));
        }

        Ok(output.stdout)
    }
}

impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.command
    }

    fn generate_plan(&self, environment: &str, memory_context: &str) -> Result<String> {
        self.ask(&planning_prompt(environment, memory_context))
    }

    fn repair_command(&self, request: &RepairRequest<'_>) -> Option<String> {
        match self.ask(&repair_prompt(request)) {
            Ok(answer) => extract_command(&answer),
            Err(e) => {
                warn!("Repair request failed: {}", e);
                None
            }
        }
    }
}

fn planning_prompt(environment: &str, memory_context: &str) -> String {
    format!(
        r#"You are CONFIGO, a development environment setup agent. Create an installation plan for the following environment.

Environment: {environment}

Previous installations and context:
{memory_context}

Respond with JSON only, using this structure:
{{
    "name": "Plan name",
    "description": "Plan description",
    "steps": [
        {{
            "name": "Step name",
            "command": "Installation command",
            "check_command": "Command that succeeds when the tool is installed",
            "tool_name": "Tool name",
            "is_extension": false,
            "extension_id": null,
            "dependencies": ["Tool name"],
            "timeout": 300,
            "priority": 1
        }}
    ]
}}

Install dependencies first and use commands appropriate for the platform."#
    )
}

fn repair_prompt(request: &RepairRequest<'_>) -> String {
    format!(
        r#"An installation command failed.

Tool: {tool}
System: {system}
Command: {command}
Error output:
{stderr}

Reply with a single corrected shell command and nothing else."#,
        tool = request.tool_name,
        system = request.system_context,
        command = request.failing_command,
        stderr = request.stderr.trim(),
    )
}

/// First non-empty line of an answer, without code fences or backticks
fn extract_command(answer: &str) -> Option<String> {
    answer
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.trim_matches('`').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
