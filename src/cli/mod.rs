use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "fleetpolicy",
    version,
    about = "Fleet integration policy reconciliation"
)]
pub struct Cli {
    /// Config file (JSON5, YAML or TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update a policy from a plan file
    Apply(ApplyOpts),
    /// Refresh the cached model from Fleet
    Refresh(ResourceOpts),
    /// Delete the policy and its private state
    Destroy(ResourceOpts),
    /// Apply every plan in a directory
    Batch(BatchOpts),
    State(StateOpts),
    Output(OutputOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct ApplyOpts {
    #[arg(short, long)]
    pub resource: String,
    #[arg(short, long)]
    pub plan: PathBuf,
    #[arg(short, long)]
    pub state: PathBuf,
}

#[derive(clap::Args)]
pub struct ResourceOpts {
    #[arg(short, long)]
    pub resource: String,
    #[arg(short, long)]
    pub state: PathBuf,
}

#[derive(clap::Args)]
pub struct BatchOpts {
    #[arg(short, long)]
    pub dir: PathBuf,
    /// Where cached models are kept; defaults to `<dir>/.state`
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct StateOpts {
    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand)]
pub enum StateAction {
    Show {
        #[arg(short, long)]
        resource: String,
    },
    Clear {
        #[arg(short, long)]
        resource: String,
    },
}

#[derive(clap::Args)]
pub struct OutputOpts {
    #[command(subcommand)]
    pub action: OutputAction,
}

#[derive(Subcommand)]
pub enum OutputAction {
    Show { id: String },
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init {
        #[arg(default_value = "fleetpolicy.json")]
        path: PathBuf,
    },
}
