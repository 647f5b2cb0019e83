//! Run command arguments.

use std::path::PathBuf;

use clap::Parser;
use speceval_core::engine::runner::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_RETRIES};

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// YAML test file
    pub test_file: PathBuf,

    /// Target name (default: the test file's `target:` key, then "default")
    #[arg(long)]
    pub target: Option<String>,

    /// Targets file (default: nearest .speceval/targets.yaml)
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Run only the test case with this id
    #[arg(long)]
    pub test_id: Option<String>,

    /// Result log (default: .speceval/results/<stem>_<timestamp>.jsonl)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Use the offline mock backend instead of the selected target
    #[arg(long)]
    pub dry_run: bool,

    /// Extra attempts after a timeout
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Per-attempt deadline in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_ATTEMPT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub agent_timeout: u64,
}
