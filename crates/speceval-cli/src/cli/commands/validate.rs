use super::super::args::ValidateArgs;
use super::runner_builder::resolve_target;
use super::{absolutize, config_error};
use crate::exit_codes;
use anyhow::Context;
use speceval_core::loader::{find_repo_root, load_test_file};

/// Loads the test file and resolves its target. Nothing is dispatched.
pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let repo_root = find_repo_root(&cwd);

    let suite = match load_test_file(&absolutize(&cwd, &args.test_file), &repo_root) {
        Ok(s) => s,
        Err(e) => return Ok(config_error(&anyhow::Error::from(e))),
    };

    println!(
        "{}: {} test case(s)",
        suite.path.display(),
        suite.cases.len()
    );
    for tc in &suite.cases {
        let aspects = tc.expected_aspect_count();
        println!(
            "  {:<20} {} aspect(s), {} guideline(s), grader {}",
            tc.id,
            aspects,
            tc.guidelines.len(),
            tc.grader
        );
        if aspects == 0 {
            eprintln!(
                "warning: '{}' has no bullet or numbered lines in its expected answer; it will always score 0",
                tc.id
            );
        }
    }

    match resolve_target(
        args.target.as_deref(),
        args.targets.as_deref(),
        &suite,
        &repo_root,
        &cwd,
    ) {
        Ok(target) => {
            println!("target {} ({})", target.name, target.kind());
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => Ok(config_error(&e)),
    }
}
