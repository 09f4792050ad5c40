//! Caller-owned planning state: cached plans and package manager detection.

use super::catalog;
use super::generator::{InstallationPlan, PlanGenerator, ToolRequest};
use crate::error::Result;
use crate::utils::shell::escape;
use std::collections::HashMap;
use tracing::{debug, warn};

/// System package managers, in detection order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Brew,
    Snap,
}

impl PackageManager {
    const ALL: [PackageManager; 6] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Pacman,
        PackageManager::Brew,
        PackageManager::Snap,
    ];

    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Pacman => "pacman",
            PackageManager::Brew => "brew",
            PackageManager::Snap => "snap",
        }
    }

    /// Shell command installing `package` non-interactively
    pub fn install_command(&self, package: &str) -> String {
        let package = escape(package);
        match self {
            PackageManager::Apt => format!(
                "sudo apt-get update && sudo apt-get install -y {}",
                package
            ),
            PackageManager::Dnf => format!("sudo dnf install -y {}", package),
            PackageManager::Yum => format!("sudo yum install -y {}", package),
            PackageManager::Pacman => format!("sudo pacman -S --noconfirm {}", package),
            PackageManager::Brew => format!("brew install {}", package),
            PackageManager::Snap => format!("sudo snap install {}", package),
        }
    }

    /// First package manager found on PATH
    pub fn detect() -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|pm| which::which(pm.binary()).is_ok())
    }
}

/// Planning state owned by the caller and reused across requests
#[derive(Debug, Default)]
pub struct PlannerSession {
    generator: PlanGenerator,
    plans: HashMap<String, InstallationPlan>,
    package_manager: Option<Option<PackageManager>>,
}

impl PlannerSession {
    pub fn new(generator: PlanGenerator) -> Self {
        Self {
            generator,
            plans: HashMap::new(),
            package_manager: None,
        }
    }

    /// Skip detection and use `package_manager` for unknown tools
    pub fn with_package_manager(mut self, package_manager: Option<PackageManager>) -> Self {
        self.package_manager = Some(package_manager);
        self
    }

    /// Detected package manager, probed once per session
    pub fn package_manager(&mut self) -> Option<PackageManager> {
        *self.package_manager.get_or_insert_with(|| {
            let detected = PackageManager::detect();
            debug!("Detected package manager: {:?}", detected);
            detected
        })
    }

    /// Build an install request for a tool given by name.
    ///
    /// Catalog tools use their package and check command; anything else is
    /// installed under its own name and checked with `--version`.
    pub fn request_for(&mut self, name: &str) -> ToolRequest {
        let pm = self.package_manager().unwrap_or_else(|| {
            warn!("No supported package manager found, assuming apt-get");
            PackageManager::Apt
        });

        match catalog::known_tool(name) {
            Some(tool) => ToolRequest::tool(tool.name, pm.install_command(tool.package))
                .with_check_command(tool.check_command),
            None => {
                let name = name.trim();
                ToolRequest::tool(name, pm.install_command(name))
                    .with_check_command(format!("{} --version", escape(name)))
            }
        }
    }

    /// Plan for `environment`, generated once and served from cache afterwards.
    ///
    /// The returned plan is a fresh copy; executing it leaves the cache intact.
    pub fn plan_for(
        &mut self,
        environment: &str,
        requests: &[ToolRequest],
        memory_context: &str,
    ) -> Result<InstallationPlan> {
        if let Some(plan) = self.plans.get(environment) {
            debug!("Using cached plan {} for '{}'", plan.id(), environment);
            return Ok(plan.clone());
        }

        let plan = self
            .generator
            .generate(requests, environment, memory_context)?;
        self.plans.insert(environment.to_string(), plan.clone());
        Ok(plan)
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }

    pub fn clear_cache(&mut self) {
        self.plans.clear();
        self.package_manager = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PlannerSession {
        PlannerSession::default().with_package_manager(Some(PackageManager::Apt))
    }

    #[test]
    fn test_request_for_known_tool() {
        let request = session().request_for("python");

        assert_eq!(request.name, "Python");
        assert_eq!(
            request.install_command,
            "sudo apt-get update && sudo apt-get install -y 'python3'"
        );
        assert_eq!(request.check_command.as_deref(), Some("python3 --version"));
    }

    #[test]
    fn test_request_for_unknown_tool() {
        let mut session = PlannerSession::default().with_package_manager(Some(PackageManager::Brew));
        let request = session.request_for("ripgrep");

        assert_eq!(request.install_command, "brew install 'ripgrep'");
        assert_eq!(request.check_command.as_deref(), Some("'ripgrep' --version"));
    }

    #[test]
    fn test_plan_cache_keyed_by_environment() {
        let mut session = session();
        let git = vec![session.request_for("git")];

        let first = session.plan_for("basics", &git, "").unwrap();
        let again = session.plan_for("basics", &[], "").unwrap();
        assert_eq!(first.id(), again.id());
        assert_eq!(again.total_steps(), 2);
        assert_eq!(session.cached_plans(), 1);

        let other = session.plan_for("empty", &[], "").unwrap();
        assert_eq!(other.total_steps(), 0);
        assert_eq!(session.cached_plans(), 2);

        session.clear_cache();
        assert_eq!(session.cached_plans(), 0);
    }

    #[test]
    fn test_install_commands() {
        assert_eq!(
            PackageManager::Pacman.install_command("git"),
            "sudo pacman -S --noconfirm 'git'"
        );
        assert_eq!(PackageManager::Dnf.install_command("git"), "sudo dnf install -y 'git'");
    }
}
