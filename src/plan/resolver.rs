//! Dependency edges and topological ordering of plan steps.

use super::catalog;
use super::step::{step_id, Step, StepKind};
use crate::error::{ConfigoError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Fill in each step's dependency edges.
///
/// Edges come from the catalog (base tools, extension host editors), from the
/// structural link between a validation step and the step it validates, and
/// from whatever the step already declared. Edges naming a step that is not in
/// the plan are dropped: the dependency is assumed to be satisfied outside it.
/// A step naming itself keeps the edge, so `resolve` reports it as a cycle.
pub fn link(steps: &mut [Step]) {
    let ids: HashSet<String> = steps.iter().map(|s| s.id().to_string()).collect();

    for step in steps.iter_mut() {
        let derived: Vec<String> = match step.kind() {
            StepKind::ToolInstall => catalog::base_dependencies(step.name())
                .iter()
                .map(|dep| step_id(StepKind::ToolInstall, dep))
                .collect(),
            StepKind::ExtensionInstall => catalog::extension_hosts(step.name())
                .iter()
                .map(|host| step_id(StepKind::ToolInstall, host))
                .collect(),
            StepKind::Validation => step.validates().map(str::to_string).into_iter().collect(),
            StepKind::LoginPortal => Vec::new(),
        };
        step.dependencies.extend(derived);

        let id = step.id().to_string();
        step.dependencies.retain(|dep| {
            let known = ids.contains(dep);
            if !known {
                debug!("Dropping dependency '{}' of '{}': not in plan", dep, id);
            }
            known
        });
    }
}

/// Topologically order steps so that each appears after all its dependencies.
///
/// Ties keep plan insertion order. A cycle is a hard failure naming the step
/// where the back-edge was found; no partial order is returned.
pub fn resolve(steps: &[Step]) -> Result<Vec<String>> {
    let graph: HashMap<&str, &Step> = steps.iter().map(|s| (s.id(), s)).collect();

    let mut sorted = Vec::with_capacity(steps.len());
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();

    for step in steps {
        visit(step.id(), &graph, &mut visited, &mut visiting, &mut sorted)?;
    }

    Ok(sorted)
}

fn visit<'a>(
    id: &'a str,
    graph: &HashMap<&'a str, &'a Step>,
    visited: &mut HashSet<&'a str>,
    visiting: &mut HashSet<&'a str>,
    sorted: &mut Vec<String>,
) -> Result<()> {
    if visited.contains(id) {
        return Ok(());
    }

    if visiting.contains(id) {
        return Err(ConfigoError::Cycle {
            step: id.to_string(),
        });
    }

    // Unknown ids are externally satisfied
    let Some(step) = graph.get(id) else {
        return Ok(());
    };

    visiting.insert(id);

    for dep in step.dependencies() {
        visit(dep.as_str(), graph, visited, visiting, sorted)?;
    }

    visiting.remove(id);
    visited.insert(id);
    sorted.push(id.to_string());

    Ok(())
}
