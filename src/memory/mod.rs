//! Memory of past installation outcomes.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// What is remembered about one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMemory {
    pub install_succeeded_before: bool,
    pub last_command: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one install, as reported to memory
#[derive(Debug, Clone, Copy)]
pub struct InstallRecord<'a> {
    pub tool_name: &'a str,
    pub command: &'a str,
    pub success: bool,
    pub version: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub trait Memory {
    fn tool_memory(&self, name: &str) -> Option<ToolMemory>;

    /// True when the tool should not be attempted again
    fn should_skip_tool(&self, name: &str) -> bool;

    fn record_installation(&mut self, record: &InstallRecord<'_>) -> Result<()>;

    /// Prose summary of past outcomes, used to nudge plan confidence
    fn memory_context(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPolicy {
    /// Skip tools that installed successfully before
    pub skip_already_installed: bool,
    /// Skip tools that failed this many times in a row
    pub max_failures: u32,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            skip_already_installed: true,
            max_failures: 3,
        }
    }
}

/// Counts over everything remembered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallStats {
    pub total: usize,
    pub installed: usize,
    pub failed: usize,
    /// Installed over total; 0 when nothing is remembered
    pub success_rate: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    tools: BTreeMap<String, ToolMemory>,
}

/// Memory kept in a JSON file, or only in process when no path is given
#[derive(Debug)]
pub struct JsonMemory {
    path: Option<PathBuf>,
    policy: MemoryPolicy,
    data: MemoryFile,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl JsonMemory {
    /// Load memory from `path`. A missing file is an empty memory.
    pub fn open(path: impl Into<PathBuf>, policy: MemoryPolicy) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let data: MemoryFile = serde_json::from_str(&content)?;
            debug!("Loaded {} tool records from {}", data.tools.len(), path.display());
            data
        } else {
            MemoryFile::default()
        };

        Ok(Self {
            path: Some(path),
            policy,
            data,
        })
    }

    pub fn in_memory(policy: MemoryPolicy) -> Self {
        Self {
            path: None,
            policy,
            data: MemoryFile::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Remembered tools, sorted by name
    pub fn tools(&self) -> impl Iterator<Item = (&str, &ToolMemory)> {
        self.data.tools.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Tools whose last remembered install failed
    pub fn failed_tools(&self) -> impl Iterator<Item = (&str, &ToolMemory)> {
        self.tools().filter(|(_, tool)| !tool.install_succeeded_before)
    }

    pub fn stats(&self) -> InstallStats {
        let total = self.data.tools.len();
        let failed = self.failed_tools().count();
        let installed = total - failed;
        InstallStats {
            total,
            installed,
            failed,
            success_rate: if total == 0 {
                0.0
            } else {
                installed as f64 / total as f64
            },
        }
    }

    /// Stop skipping tools for their failure count; already installed
    /// tools are still skipped per policy
    pub fn retrying_failures(mut self) -> Self {
        self.policy.max_failures = u32::MAX;
        self
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data.tools.clear();
        self.save()
    }

    /// Write the memory file with owner-only permissions (0600)
    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(path, content)?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

impl Memory for JsonMemory {
    fn tool_memory(&self, name: &str) -> Option<ToolMemory> {
        self.data.tools.get(&key(name)).cloned()
    }

    fn should_skip_tool(&self, name: &str) -> bool {
        let Some(tool) = self.data.tools.get(&key(name)) else {
            return false;
        };

        (tool.install_succeeded_before && self.policy.skip_already_installed)
            || tool.failure_count >= self.policy.max_failures
    }

    fn record_installation(&mut self, record: &InstallRecord<'_>) -> Result<()> {
        let now = Utc::now();
        let entry = self
            .data
            .tools
            .entry(key(record.tool_name))
            .or_insert_with(|| ToolMemory {
                install_succeeded_before: false,
                last_command: String::new(),
                version: None,
                failure_count: 0,
                last_error: None,
                updated_at: now,
            });

        entry.last_command = record.command.to_string();
        entry.updated_at = now;
        if record.success {
            entry.install_succeeded_before = true;
            entry.version = record.version.map(str::to_string);
            entry.failure_count = 0;
            entry.last_error = None;
        } else {
            entry.install_succeeded_before = false;
            entry.failure_count += 1;
            entry.last_error = record.error.map(str::to_string);
        }

        info!(
            "Recorded {} install of {}",
            if record.success { "successful" } else { "failed" },
            record.tool_name
        );
        self.save()
    }

    fn memory_context(&self) -> String {
        let (succeeded, failed): (Vec<_>, Vec<_>) = self
            .data
            .tools
            .iter()
            .partition(|(_, tool)| tool.install_succeeded_before);

        let mut lines = Vec::new();
        if !succeeded.is_empty() {
            let names: Vec<&str> = succeeded.iter().map(|(k, _)| k.as_str()).collect();
            lines.push(format!("Successfully installed tools: {}", names.join(", ")));
        }
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|(k, _)| k.as_str()).collect();
            lines.push(format!("Previously failed tools: {}", names.join(", ")));
        }
        lines.join("\n")
    }
}
