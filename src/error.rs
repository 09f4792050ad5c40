use crate::plan::step::StepStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigoError {
    #[error("Circular dependency detected involving step '{step}'")]
    Cycle { step: String },

    #[error("Step not found in plan: {0}")]
    StepNotFound(String),

    #[error("Cannot {action} step '{step}' while it is {from}")]
    InvalidTransition {
        step: String,
        from: StepStatus,
        action: &'static str,
    },

    #[error("Step '{step}' depends on '{dependency}', which has not completed")]
    DependencyIncomplete { step: String, dependency: String },

    #[error("No tools requested; name tools, or use --preset or --env")]
    NoTools,

    #[error("Unknown preset '{name}' (available: {available})")]
    UnknownPreset { name: String, available: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),
}

pub type Result<T> = std::result::Result<T, ConfigoError>;
