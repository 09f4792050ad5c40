//! Parsing of agent plan text into tool requests.

use crate::plan::ToolRequest;
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_TOOL: &str = "git";
const DEFAULT_COMMAND: &str = "sudo apt-get update && sudo apt-get install -y git";

/// A plan proposed by an agent, reduced to what the generator needs
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPlan {
    pub name: String,
    pub description: String,
    /// Requests in the agent's priority order
    pub requests: Vec<ToolRequest>,
    /// True when the agent's answer was unusable and the default plan was used
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<PlanDocumentStep>,
}

#[derive(Debug, Deserialize)]
struct PlanDocumentStep {
    name: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    check_command: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    is_extension: bool,
    #[serde(default)]
    extension_id: Option<String>,
    #[serde(default)]
    portal_url: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default = "lowest_priority")]
    priority: i64,
}

fn lowest_priority() -> i64 {
    i64::MAX
}

impl From<PlanDocumentStep> for ToolRequest {
    fn from(step: PlanDocumentStep) -> Self {
        let name = step
            .tool_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(step.name);

        ToolRequest {
            name,
            install_command: step.command,
            check_command: step.check_command,
            is_extension: step.is_extension,
            extension_id: step.extension_id,
            portal_url: step.portal_url,
            dependencies: step.dependencies,
            timeout_secs: step.timeout,
        }
    }
}

/// The fixed plan used whenever agent output cannot be used
pub fn default_plan(environment: &str) -> AgentPlan {
    AgentPlan {
        name: format!("Basic Plan for {}", environment),
        description: format!("Basic installation plan for {}", environment),
        requests: vec![ToolRequest::tool(DEFAULT_TOOL, DEFAULT_COMMAND)],
        fallback: true,
    }
}

/// Extract a plan from free-form agent output.
///
/// The JSON object is taken from the first `{` to the last `}`; any text
/// around it is ignored. Steps are sorted by ascending `priority` (stable, so
/// equal priorities keep their order). No braces, invalid JSON or an empty
/// step list all yield [`default_plan`].
pub fn parse_plan_response(text: &str, environment: &str) -> AgentPlan {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        warn!("No JSON object in agent response, using default plan");
        return default_plan(environment);
    };
    if end < start {
        warn!("Malformed agent response, using default plan");
        return default_plan(environment);
    }

    let document: PlanDocument = match serde_json::from_str(&text[start..=end]) {
        Ok(document) => document,
        Err(e) => {
            warn!("Failed to parse agent plan: {}", e);
            return default_plan(environment);
        }
    };

    if document.steps.is_empty() {
        warn!("Agent plan has no steps, using default plan");
        return default_plan(environment);
    }

    let mut steps = document.steps;
    steps.sort_by_key(|s| s.priority);
    debug!("Agent proposed {} steps", steps.len());

    AgentPlan {
        name: document.name,
        description: document.description,
        requests: steps.into_iter().map(ToolRequest::from).collect(),
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_json_surrounded_by_prose() {
        let text = r#"Sure! Here is your plan:
```json
{"name": "Web", "description": "Node stack", "steps": [
  {"name": "Install Node", "command": "sudo apt-get install -y nodejs", "tool_name": "Node.js", "priority": 2},
  {"name": "Install Git", "command": "sudo apt-get install -y git", "tool_name": "Git", "priority": 1, "timeout": 120},
  {"name": "REST Client", "is_extension": true, "extension_id": "humao.rest-client", "dependencies": ["VS Code"]}
]}
```
Let me know if you need anything else."#;

        let plan = parse_plan_response(text, "web");

        assert!(!plan.fallback);
        assert_eq!(plan.name, "Web");
        let names: Vec<&str> = plan.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Git", "Node.js", "REST Client"]);
        assert!(plan.requests[2].is_extension);
        assert_eq!(plan.requests[2].dependencies, ["VS Code"]);
        assert_eq!(plan.requests[0].timeout_secs, Some(120));
        assert_eq!(plan.requests[1].timeout_secs, None);
    }

    #[test]
    fn test_no_braces_falls_back() {
        let plan = parse_plan_response("I cannot help with that.", "data");

        assert!(plan.fallback);
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].name, "git");
        assert_eq!(plan.requests[0].install_command, DEFAULT_COMMAND);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        assert!(parse_plan_response("{ not json }", "x").fallback);
        assert!(parse_plan_response("} backwards {", "x").fallback);
    }

    #[test]
    fn test_empty_steps_fall_back() {
        let plan = parse_plan_response(r#"{"name": "nothing", "steps": []}"#, "x");
        assert!(plan.fallback);
        assert_eq!(plan.name, "Basic Plan for x");
    }

    #[test]
    fn test_step_name_used_without_tool_name() {
        let plan = parse_plan_response(
            r#"{"steps": [{"name": "ripgrep", "command": "cargo install ripgrep"}]}"#,
            "x",
        );
        assert_eq!(plan.requests[0].name, "ripgrep");
        assert_eq!(plan.requests[0].install_command, "cargo install ripgrep");
    }
}
