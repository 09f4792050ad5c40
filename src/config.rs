use crate::cli::{Cli, Commands};
use crate::error::{ConfigoError, Result};
use crate::executor::RetryPolicy;
use crate::memory::MemoryPolicy;
use crate::plan::step::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::plan::GeneratorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".configo.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub portal: PortalConfig,

    /// Verbose mode (not stored in config file)
    #[serde(skip)]
    pub verbose: bool,

    /// Answer yes to every confirmation (not stored in config file)
    #[serde(skip)]
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Timeout for "is it already installed" probes
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,

    /// Sleep before retry n is `backoff_base_ms * 2^n`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_true")]
    pub auto_retry: bool,

    #[serde(default = "default_true")]
    pub self_heal: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
            backoff_base_ms: default_backoff_base_ms(),
            auto_retry: true,
            self_heal: true,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_probe_timeout_seconds() -> u64 {
    10
}

fn default_backoff_base_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_validation_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: default_validation_timeout(),
        }
    }
}

fn default_validation_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Memory file; `~` is expanded
    #[serde(default = "default_memory_path")]
    pub path: String,

    #[serde(default = "default_true")]
    pub skip_already_installed: bool,

    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_memory_path(),
            skip_already_installed: true,
            max_failures: default_max_failures(),
        }
    }
}

fn default_memory_path() -> String {
    "~/.configo/memory.json".to_string()
}

fn default_max_failures() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// External command that answers prompts on stdout; empty means offline
    #[serde(default)]
    pub command: String,

    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_seconds: default_agent_timeout(),
        }
    }
}

fn default_agent_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command used to open portal URLs; empty means the platform default
    #[serde(default)]
    pub opener: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            opener: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration with precedence:
    /// 1. CLI flags (applied later via with_cli_overrides)
    /// 2. Environment variables
    /// 3. Project config (.configo.toml in the working directory)
    /// 4. Global config (~/.configo.toml)
    /// 5. Built-in defaults
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_config) = global_config_path() {
            if global_config.exists() {
                config = config.merge(Self::from_file(&global_config)?);
            }
        }

        let project_config = project_root.join(CONFIG_FILE_NAME);
        if project_config.exists() {
            config = config.merge(Self::from_file(&project_config)?);
        }

        config = config.merge_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Reject values no run could work with
    pub fn validate(&self) -> Result<()> {
        if self.execution.timeout_seconds == 0 {
            return Err(ConfigoError::InvalidConfig(
                "execution.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.validation.timeout_seconds == 0 {
            return Err(ConfigoError::InvalidConfig(
                "validation.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.memory.enabled && self.memory.path.trim().is_empty() {
            return Err(ConfigoError::InvalidConfig(
                "memory.path must not be empty when memory is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence where it
    /// differs from the built-in default)
    fn merge(mut self, other: Self) -> Self {
        let defaults = Self::default();

        // Execution
        if other.execution.max_retries != defaults.execution.max_retries {
            self.execution.max_retries = other.execution.max_retries;
        }
        if other.execution.timeout_seconds != defaults.execution.timeout_seconds {
            self.execution.timeout_seconds = other.execution.timeout_seconds;
        }
        if other.execution.probe_timeout_seconds != defaults.execution.probe_timeout_seconds {
            self.execution.probe_timeout_seconds = other.execution.probe_timeout_seconds;
        }
        if other.execution.backoff_base_ms != defaults.execution.backoff_base_ms {
            self.execution.backoff_base_ms = other.execution.backoff_base_ms;
        }
        if other.execution.auto_retry != defaults.execution.auto_retry {
            self.execution.auto_retry = other.execution.auto_retry;
        }
        if other.execution.self_heal != defaults.execution.self_heal {
            self.execution.self_heal = other.execution.self_heal;
        }

        // Validation
        if other.validation.enabled != defaults.validation.enabled {
            self.validation.enabled = other.validation.enabled;
        }
        if other.validation.timeout_seconds != defaults.validation.timeout_seconds {
            self.validation.timeout_seconds = other.validation.timeout_seconds;
        }

        // Memory
        if other.memory.enabled != defaults.memory.enabled {
            self.memory.enabled = other.memory.enabled;
        }
        if other.memory.path != defaults.memory.path {
            self.memory.path = other.memory.path;
        }
        if other.memory.skip_already_installed != defaults.memory.skip_already_installed {
            self.memory.skip_already_installed = other.memory.skip_already_installed;
        }
        if other.memory.max_failures != defaults.memory.max_failures {
            self.memory.max_failures = other.memory.max_failures;
        }

        // Agent
        if !other.agent.command.is_empty() {
            self.agent.command = other.agent.command;
        }
        if other.agent.timeout_seconds != defaults.agent.timeout_seconds {
            self.agent.timeout_seconds = other.agent.timeout_seconds;
        }

        // Portal
        if other.portal.enabled != defaults.portal.enabled {
            self.portal.enabled = other.portal.enabled;
        }
        if !other.portal.opener.is_empty() {
            self.portal.opener = other.portal.opener;
        }

        self
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    fn merge_env(mut self) -> Self {
        if let Some(value) = env_parse("CONFIGO_MAX_RETRIES") {
            self.execution.max_retries = value;
        }
        if let Some(value) = env_parse("CONFIGO_TIMEOUT_SECONDS") {
            self.execution.timeout_seconds = value;
        }
        if let Some(value) = env_bool("CONFIGO_AUTO_RETRY") {
            self.execution.auto_retry = value;
        }
        if let Some(value) = env_bool("CONFIGO_SELF_HEAL") {
            self.execution.self_heal = value;
        }
        if let Some(value) = env_bool("CONFIGO_VALIDATION_ENABLED") {
            self.validation.enabled = value;
        }
        if let Some(value) = env_bool("CONFIGO_MEMORY_ENABLED") {
            self.memory.enabled = value;
        }
        if let Ok(path) = std::env::var("CONFIGO_MEMORY_PATH") {
            if !path.is_empty() {
                self.memory.path = path;
            }
        }
        if let Ok(command) = std::env::var("CONFIGO_AGENT_COMMAND") {
            self.agent.command = command;
        }

        self
    }

    /// Apply CLI overrides (highest precedence)
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        self.verbose = cli.verbose;

        if let Commands::Install(cmd) = &cli.command {
            let flags = &cmd.execution;
            if let Some(max_retries) = flags.max_retries {
                self.execution.max_retries = max_retries;
            }
            if let Some(timeout) = flags.timeout {
                self.execution.timeout_seconds = timeout;
            }
            if flags.no_self_heal {
                self.execution.self_heal = false;
            }
            if flags.no_auto_retry {
                self.execution.auto_retry = false;
            }
            if cmd.no_validate {
                self.validation.enabled = false;
            }
            self.assume_yes = cmd.yes;
        }

        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            auto_retry: self.execution.auto_retry,
            backoff_base: Duration::from_millis(self.execution.backoff_base_ms),
            self_heal: self.execution.self_heal,
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            max_retries: self.execution.max_retries,
            timeout_secs: self.execution.timeout_seconds,
            validation_timeout_secs: self.validation.timeout_seconds,
        }
    }

    pub fn memory_policy(&self) -> MemoryPolicy {
        MemoryPolicy {
            skip_already_installed: self.memory.skip_already_installed,
            max_failures: self.memory.max_failures,
        }
    }

    /// Memory file with `~` expanded
    pub fn memory_path(&self) -> PathBuf {
        crate::utils::path::expand_tilde(&self.memory.path)
            .unwrap_or_else(|| PathBuf::from(&self.memory.path))
    }
}

/// `~/.configo.toml`, when HOME is set
pub fn global_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Get the home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
