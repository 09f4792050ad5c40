use clap::Parser;

/// Where the tool list comes from. Shared by `install` and `plan`.
#[derive(Parser, Debug, Clone, Default)]
pub struct SourceFlags {
    /// Tools to install, by name (e.g. git python docker)
    pub tools: Vec<String>,

    /// Describe the environment and let the agent plan it
    #[arg(long = "env", value_name = "DESC")]
    pub environment: Option<String>,

    /// Add the tools of a preset (web_development, python_development, ...)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,
}

/// Execution overrides for the install command.
#[derive(Parser, Debug, Clone, Default)]
pub struct ExecutionFlags {
    /// Maximum retries per tool install step
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Timeout per install command, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Don't ask the agent to repair failing commands
    #[arg(long)]
    pub no_self_heal: bool,

    /// Run every command once, without retries
    #[arg(long)]
    pub no_auto_retry: bool,
}
