//! Planning and repair assistant.
//!
//! An [`Agent`] turns an environment description into plan text and proposes
//! replacement commands for failed installs. Two implementations exist:
//!
//! - [`OfflineAgent`]: canned plan, never repairs. Used when no assistant
//!   command is configured.
//! - [`CommandAgent`]: pipes a prompt into an external command (for example a
//!   wrapper around an LLM CLI) and reads its answer from stdout.
//!
//! Plan text is free-form and may be malformed; [`parse_plan_response`] always
//! yields a usable plan by falling back to [`default_plan`].
//!
//! # Plan format
//!
//! ```json
//! {
//!   "name": "Python data science",
//!   "description": "Python with notebooks",
//!   "steps": [
//!     {
//!       "name": "Install Python",
//!       "command": "sudo apt-get install -y python3 python3-pip",
//!       "tool_name": "Python",
//!       "is_extension": false,
//!       "extension_id": null,
//!       "dependencies": [],
//!       "timeout": 300,
//!       "priority": 1
//!     }
//!   ]
//! }
//! ```

pub mod command;
pub mod response;

pub use command::CommandAgent;
pub use response::{default_plan, parse_plan_response, AgentPlan};

use crate::error::Result;
use tracing::warn;

/// Context handed to the agent when a command failed
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    pub failing_command: &'a str,
    pub stderr: &'a str,
    pub tool_name: &'a str,
    pub system_context: &'a str,
}

pub trait Agent {
    fn name(&self) -> &str;

    /// Raw plan text for `environment`
    fn generate_plan(&self, environment: &str, memory_context: &str) -> Result<String>;

    /// Replacement command for a failed one, if the agent has a suggestion
    fn repair_command(&self, request: &RepairRequest<'_>) -> Option<String>;
}

const OFFLINE_PLAN: &str = r#"{
    "name": "Basic Development Environment",
    "description": "Standard development environment setup",
    "steps": [
        {
            "name": "Install Git",
            "command": "sudo apt-get update && sudo apt-get install -y git",
            "description": "Install Git version control",
            "tool_name": "git",
            "is_extension": false,
            "extension_id": null,
            "dependencies": [],
            "timeout": 300,
            "priority": 1
        },
        {
            "name": "Install Python",
            "command": "sudo apt-get install -y python3 python3-pip",
            "description": "Install Python and pip",
            "tool_name": "python",
            "is_extension": false,
            "extension_id": null,
            "dependencies": [],
            "timeout": 300,
            "priority": 2
        }
    ]
}"#;

/// Agent used without an assistant command
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAgent;

impl Agent for OfflineAgent {
    fn name(&self) -> &str {
        "offline"
    }

    fn generate_plan(&self, _environment: &str, _memory_context: &str) -> Result<String> {
        Ok(OFFLINE_PLAN.to_string())
    }

    fn repair_command(&self, _request: &RepairRequest<'_>) -> Option<String> {
        None
    }
}

/// Ask `agent` for a plan and parse it, falling back to the default plan
/// when the agent fails or answers with something unusable
pub fn request_plan(agent: &dyn Agent, environment: &str, memory_context: &str) -> AgentPlan {
    match agent.generate_plan(environment, memory_context) {
        Ok(text) => parse_plan_response(&text, environment),
        Err(e) => {
            warn!("{} could not produce a plan: {}", agent.name(), e);
            default_plan(environment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigoError;

    struct Broken;

    impl Agent for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn generate_plan(&self, _environment: &str, _memory_context: &str) -> Result<String> {
            Err(ConfigoError::Agent("no connection".to_string()))
        }

        fn repair_command(&self, _request: &RepairRequest<'_>) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_offline_plan_parses() {
        let plan = request_plan(&OfflineAgent, "basics", "");

        assert!(!plan.fallback);
        let names: Vec<&str> = plan.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["git", "python"]);
    }

    #[test]
    fn test_failing_agent_falls_back() {
        let plan = request_plan(&Broken, "web", "");

        assert!(plan.fallback);
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.name, "Basic Plan for web");
    }

    #[test]
    fn test_offline_agent_never_repairs() {
        let request = RepairRequest {
            failing_command: "false",
            stderr: "",
            tool_name: "git",
            system_context: "",
        };
        assert!(OfflineAgent.repair_command(&request).is_none());
    }
}
