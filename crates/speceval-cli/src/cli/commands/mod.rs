use super::args::*;

pub(crate) mod run;
pub(crate) mod runner_builder;
pub mod targets;
pub mod validate;

use crate::exit_codes::CONFIG_ERROR;
use std::path::{Path, PathBuf};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args, cli.verbose).await,
        Command::Targets(args) => targets::run(args),
        Command::Validate(args) => validate::run(args),
    }
}

/// Prints a configuration problem with its cause chain and yields exit code 2.
pub(crate) fn config_error(err: &anyhow::Error) -> i32 {
    eprintln!("config error: {err:#}");
    CONFIG_ERROR
}

pub(crate) fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
