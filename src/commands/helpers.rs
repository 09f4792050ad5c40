use crate::agent::{request_plan, Agent, CommandAgent, OfflineAgent};
use crate::cli::SourceFlags;
use crate::config::Config;
use crate::error::{ConfigoError, Result};
use crate::memory::{JsonMemory, Memory};
use crate::plan::catalog;
use crate::plan::{PlannerSession, ToolRequest};
use std::time::Duration;
use tracing::{debug, warn};

/// Requests and the environment label they were planned for
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSource {
    pub environment: String,
    pub requests: Vec<ToolRequest>,
}

/// Agent configured by `[agent] command`, or the offline agent
pub fn make_agent(config: &Config) -> Box<dyn Agent> {
    let command = config.agent.command.trim();
    if command.is_empty() {
        debug!("No agent command configured, planning offline");
        Box::new(OfflineAgent)
    } else {
        Box::new(CommandAgent::new(
            command,
            Duration::from_secs(config.agent.timeout_seconds),
        ))
    }
}

/// Memory file from the config, or an in-process memory when disabled
pub fn open_memory(config: &Config) -> Result<JsonMemory> {
    if !config.memory.enabled {
        return Ok(JsonMemory::in_memory(config.memory_policy()));
    }
    JsonMemory::open(config.memory_path(), config.memory_policy())
}

/// Collect requests from `--env`, `--preset` and tool names, in that order.
/// Tools already requested by name are not added twice.
pub fn resolve_requests(
    source: &SourceFlags,
    session: &mut PlannerSession,
    agent: &dyn Agent,
    memory: &dyn Memory,
    config: &Config,
) -> Result<PlanSource> {
    let mut requests: Vec<ToolRequest> = Vec::new();

    if let Some(environment) = &source.environment {
        let plan = request_plan(agent, environment, &memory.memory_context());
        if plan.fallback {
            warn!("Agent plan unusable, using the default plan");
            println!("⚠ Could not get a plan for '{}', using: {}", environment, plan.name);
        }
        requests.extend(plan.requests);
    }

    let mut names: Vec<&str> = Vec::new();
    if let Some(name) = &source.preset {
        let tools = catalog::preset(name).ok_or_else(|| ConfigoError::UnknownPreset {
            name: name.clone(),
            available: catalog::preset_names().collect::<Vec<_>>().join(", "),
        })?;
        names.extend(tools.iter().copied());
    }
    names.extend(source.tools.iter().map(String::as_str));

    for name in names {
        let request = session.request_for(name);
        if requests.iter().any(|r| r.name.eq_ignore_ascii_case(&request.name)) {
            continue;
        }
        requests.push(request);
    }

    if !config.portal.enabled {
        requests.retain(|r| r.portal_url.is_none());
    }
    if requests.is_empty() {
        return Err(ConfigoError::NoTools);
    }

    let environment = match &source.environment {
        Some(environment) => environment.clone(),
        None => requests
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    Ok(PlanSource {
        environment,
        requests,
    })
}

/// Requests reinstalling every tool whose last remembered install failed.
/// The remembered command is reused when there is one. Empty when nothing failed.
pub fn retry_requests(memory: &JsonMemory, session: &mut PlannerSession) -> Option<PlanSource> {
    let requests: Vec<ToolRequest> = memory
        .failed_tools()
        .map(|(name, tool)| {
            let mut request = session.request_for(name);
            if !tool.last_command.trim().is_empty() {
                request.install_command = tool.last_command.clone();
            }
            request
        })
        .collect();

    if requests.is_empty() {
        return None;
    }

    debug!("Retrying {} failed installs", requests.len());
    let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
    Some(PlanSource {
        environment: format!("retry: {}", names.join(", ")),
        requests,
    })
}

/// Short description of the host, handed to the agent for repairs
pub fn system_context(session: &mut PlannerSession) -> String {
    let package_manager = session
        .package_manager()
        .map(|pm| pm.binary())
        .unwrap_or("unknown");
    format!(
        "{} {}, package manager: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        package_manager
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InstallRecord, MemoryPolicy};
    use crate::plan::{PackageManager, PlanGenerator};

    fn session() -> PlannerSession {
        PlannerSession::new(PlanGenerator::default()).with_package_manager(Some(PackageManager::Apt))
    }

    fn source(tools: &[&str], preset: Option<&str>) -> SourceFlags {
        SourceFlags {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            environment: None,
            preset: preset.map(str::to_string),
        }
    }

    #[test]
    fn test_tools_by_name() {
        let memory = JsonMemory::in_memory(MemoryPolicy::default());
        let resolved = resolve_requests(
            &source(&["git", "python"], None),
            &mut session(),
            &OfflineAgent,
            &memory,
            &Config::default(),
        )
        .unwrap();

        assert_eq!(resolved.requests.len(), 2);
        assert_eq!(resolved.requests[0].name, "Git");
        assert!(resolved.requests[0].install_command.contains("apt-get install -y 'git'"));
        assert_eq!(resolved.environment, "Git, Python");
    }

    #[test]
    fn test_preset_merges_with_tools() {
        let memory = JsonMemory::in_memory(MemoryPolicy::default());
        let resolved = resolve_requests(
            &source(&["git"], Some("python_development")),
            &mut session(),
            &OfflineAgent,
            &memory,
            &Config::default(),
        )
        .unwrap();

        let git = resolved
            .requests
            .iter()
            .filter(|r| r.name == "Git")
            .count();
        assert_eq!(git, 1);
        assert!(resolved.requests.iter().any(|r| r.name == "Python"));
    }

    #[test]
    fn test_unknown_preset() {
        let memory = JsonMemory::in_memory(MemoryPolicy::default());
        let err = resolve_requests(
            &source(&[], Some("gaming")),
            &mut session(),
            &OfflineAgent,
            &memory,
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigoError::UnknownPreset { .. }));
        assert!(err.to_string().contains("web_development"));
    }

    #[test]
    fn test_nothing_requested() {
        let memory = JsonMemory::in_memory(MemoryPolicy::default());
        let err = resolve_requests(
            &source(&[], None),
            &mut session(),
            &OfflineAgent,
            &memory,
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigoError::NoTools));
    }

    #[test]
    fn test_environment_goes_through_agent() {
        let memory = JsonMemory::in_memory(MemoryPolicy::default());
        let flags = SourceFlags {
            environment: Some("python scripting".to_string()),
            ..Default::default()
        };

        let resolved =
            resolve_requests(&flags, &mut session(), &OfflineAgent, &memory, &Config::default())
                .unwrap();

        assert_eq!(resolved.environment, "python scripting");
        assert!(!resolved.requests.is_empty());
    }

    #[test]
    fn test_make_agent() {
        let mut config = Config::default();
        assert_eq!(make_agent(&config).name(), "offline");

        config.agent.command = "cat".to_string();
        assert_eq!(make_agent(&config).name(), "cat");
    }

    #[test]
    fn test_retry_requests_reuse_remembered_command() {
        let mut memory = JsonMemory::in_memory(MemoryPolicy::default());
        assert!(retry_requests(&memory, &mut session()).is_none());

        for (tool_name, command, success) in [
            ("docker", "curl -fsSL get.docker.com | sh", false),
            ("ripgrep", "", false),
            ("git", "apt-get install -y git", true),
        ] {
            memory
                .record_installation(&InstallRecord {
                    tool_name,
                    command,
                    success,
                    version: None,
                    error: None,
                })
                .unwrap();
        }

        let source = retry_requests(&memory, &mut session()).unwrap();
        let names: Vec<&str> = source.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Docker", "ripgrep"]);
        assert_eq!(source.requests[0].install_command, "curl -fsSL get.docker.com | sh");
        assert!(source.requests[1].install_command.contains("apt-get install -y 'ripgrep'"));
        assert_eq!(source.environment, "retry: Docker, ripgrep");
    }
}
