use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod flags;
pub use flags::{ExecutionFlags, SourceFlags};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration files
    Validate {
        /// Optional path to a specific config file to validate
        file: Option<PathBuf>,
    },

    /// Show effective configuration after merging all sources
    Show,
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommands {
    /// List remembered tools and their last outcome
    Show,

    /// Forget everything
    Clear {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "configo")]
#[command(about = "Plan, install and validate development tools", long_about = None)]
#[command(version = env!("CONFIGO_VERSION"))]
#[command(after_help = "\
EXAMPLES:
  configo install git python          Install tools from the built-in catalog
  configo install --preset web_development
  configo plan --env \"data science with jupyter\" --json
  configo validate docker node
  configo validate --system --env
  configo install --retry-failed

For details about a specific command, use:
  configo <command> --help")]
pub struct Cli {
    /// Show debug logs
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and install tools, then validate them
    Install(InstallCmd),

    /// Show the plan that install would run, without running it
    Plan(PlanCmd),

    /// Run validation probes against installed tools
    Validate(ValidateCmd),

    /// Inspect or clear the installation memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Parser, Debug)]
pub struct InstallCmd {
    #[command(flatten)]
    pub source: SourceFlags,

    /// Reinstall tools whose last remembered install failed
    #[arg(long, conflicts_with_all = ["tools", "environment", "preset"])]
    pub retry_failed: bool,

    #[command(flatten)]
    pub execution: ExecutionFlags,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Skip post-install validation
    #[arg(long)]
    pub no_validate: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Tools to validate
    #[arg(required_unless_present_any = ["system", "environment"])]
    pub tools: Vec<String>,

    /// Also check disk space, memory, network and sudo
    #[arg(long)]
    pub system: bool,

    /// Also check python, git and a package manager
    #[arg(long = "env")]
    pub environment: bool,
}

#[derive(Parser, Debug)]
pub struct PlanCmd {
    #[command(flatten)]
    pub source: SourceFlags,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}
