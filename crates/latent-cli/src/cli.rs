use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "latent",
    about = "Latent: lazy attribute loading for enhanced entities",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show how the entities of a mapping file split into fetch groups
    Plan(PlanArgs),
    /// Run the lazy-loading scenarios against the in-memory store
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct PlanArgs {
    /// TOML mapping file
    pub mapping: PathBuf,
    /// Only show this entity type
    #[arg(short, long)]
    pub entity: Option<String>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Let detached entities load through a temporary session
    #[arg(long)]
    pub allow_load_outside_transaction: bool,
}
