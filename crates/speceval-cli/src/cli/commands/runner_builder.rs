use super::super::args::RunArgs;
use super::absolutize;
use anyhow::Context;
use speceval_core::engine::{RunPolicy, Runner};
use speceval_core::loader::TestSuite;
use speceval_core::providers::Backend;
use speceval_core::targets::{
    env_lookup, find_target, load_targets, locate_targets_file, select_target_name,
    TargetConfig, TARGETS_DIR, TARGETS_FILE,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Resolves the target named by `--target`, the test file, or `default`.
pub(crate) fn resolve_target(
    cli_target: Option<&str>,
    targets_file: Option<&Path>,
    suite: &TestSuite,
    repo_root: &Path,
    cwd: &Path,
) -> anyhow::Result<TargetConfig> {
    let name = select_target_name(cli_target, suite.target.as_deref());
    let path = targets_path(targets_file, suite, repo_root, cwd)?;
    let targets = load_targets(&path)?;
    let definition = find_target(&targets, &name)?;
    let target = definition.resolve(repo_root, &env_lookup)?;
    tracing::debug!(target_name = %target.name, provider = %target.kind(), file = %path.display(), "target resolved");
    Ok(target)
}

pub(crate) fn targets_path(
    explicit: Option<&Path>,
    suite: &TestSuite,
    repo_root: &Path,
    cwd: &Path,
) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(absolutize(cwd, p));
    }
    let start = suite.path.parent().unwrap_or(repo_root);
    locate_targets_file(start, repo_root).with_context(|| {
        format!(
            "no {TARGETS_DIR}/{TARGETS_FILE} found between {} and {}; pass --targets or --dry-run",
            start.display(),
            repo_root.display()
        )
    })
}

pub(crate) fn build_runner(
    args: &RunArgs,
    suite: &TestSuite,
    repo_root: &Path,
    cwd: &Path,
) -> anyhow::Result<Runner> {
    let target = if args.dry_run {
        eprintln!("note: --dry-run active; using the mock backend");
        TargetConfig::mock(None)
    } else {
        resolve_target(
            args.target.as_deref(),
            args.targets.as_deref(),
            suite,
            repo_root,
            cwd,
        )?
    };

    let backend = Backend::from_target(&target)?;

    let policy = RunPolicy {
        attempt_timeout: Duration::from_secs(args.agent_timeout),
        max_retries: args.max_retries,
        test_id: args.test_id.clone(),
        ..RunPolicy::default()
    };

    Ok(Runner::new(Arc::new(backend), policy))
}
