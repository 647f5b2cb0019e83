use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod run;
pub use run::*;

#[derive(Parser)]
#[command(
    name = "speceval",
    version,
    about = "Run declarative answer evaluations against LLM backends and score the replies"
)]
pub struct Cli {
    /// Debug logging and full failure causes in the summary
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the test cases of a test file and append scores to a JSONL log
    Run(RunArgs),
    /// List the targets defined in the targets file
    Targets(TargetsArgs),
    /// Load a test file and resolve its target without dispatching anything
    Validate(ValidateArgs),
}

#[derive(clap::Args, Clone)]
pub struct TargetsArgs {
    /// Targets file (default: nearest .speceval/targets.yaml)
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Also resolve each target's settings, failing on unset variables
    #[arg(long)]
    pub check: bool,
}

#[derive(clap::Args, Clone)]
pub struct ValidateArgs {
    /// YAML test file
    pub test_file: PathBuf,

    #[arg(long)]
    pub target: Option<String>,

    #[arg(long)]
    pub targets: Option<PathBuf>,
}
