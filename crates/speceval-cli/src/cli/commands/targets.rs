use super::super::args::TargetsArgs;
use super::{absolutize, config_error};
use crate::exit_codes;
use anyhow::Context;
use speceval_core::loader::find_repo_root;
use speceval_core::targets::{
    env_lookup, load_targets, locate_targets_file, TARGETS_DIR, TARGETS_FILE,
};

pub fn run(args: TargetsArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let repo_root = find_repo_root(&cwd);

    let path = match &args.targets {
        Some(p) => absolutize(&cwd, p),
        None => match locate_targets_file(&cwd, &repo_root) {
            Some(p) => p,
            None => {
                eprintln!(
                    "config error: no {TARGETS_DIR}/{TARGETS_FILE} found between {} and {}",
                    cwd.display(),
                    repo_root.display()
                );
                return Ok(exit_codes::CONFIG_ERROR);
            }
        },
    };

    let targets = match load_targets(&path) {
        Ok(t) => t,
        Err(e) => return Ok(config_error(&anyhow::Error::from(e))),
    };

    println!("{}", path.display());
    let mut broken = 0usize;
    for def in &targets {
        if !args.check {
            println!("  {:<20} {}", def.name, def.provider);
            continue;
        }
        match def.resolve(&repo_root, &env_lookup) {
            Ok(_) => println!("  {:<20} {:<10} ok", def.name, def.provider),
            Err(e) => {
                broken += 1;
                println!("  {:<20} {:<10} error: {e}", def.name, def.provider);
            }
        }
    }

    if broken > 0 {
        eprintln!("{broken} target(s) failed to resolve");
        return Ok(exit_codes::CONFIG_ERROR);
    }
    Ok(exit_codes::SUCCESS)
}
