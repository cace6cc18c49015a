use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lsconverge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge the Logstash package and its plugins", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the guarded action plan
    Plan(PlanArgs),

    /// Show which actions would run on this host
    Status(StatusArgs),

    /// Converge this host to the configured state
    Apply(ApplyArgs),

    /// Print detected host facts
    Facts(FactsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Site config file (TOML or JSON)
    #[arg(short, long, env = "LSCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Only plan a target: package, plugin, or plugin.<name>
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Site config file (TOML or JSON)
    #[arg(short, long, env = "LSCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only check a target: package, plugin, or plugin.<name>
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Site config file (TOML or JSON)
    #[arg(short, long, env = "LSCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only apply a target: package, plugin, or plugin.<name>
    #[arg(short, long)]
    pub target: Option<String>,

    /// Show what would change without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Number of independent actions to run at once
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct FactsArgs {
    /// Site config file (TOML or JSON), for fact overrides
    #[arg(short, long, env = "LSCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,
}
