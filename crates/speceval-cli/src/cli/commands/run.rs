use super::super::args::RunArgs;
use super::runner_builder::build_runner;
use super::{absolutize, config_error};
use crate::exit_codes;
use anyhow::Context;
use speceval_core::engine::SuiteReport;
use speceval_core::errors::SuiteError;
use speceval_core::loader::{find_repo_root, load_test_file};
use speceval_core::report::console::{default_progress_sink, print_summary};
use speceval_core::report::{default_output_path, JsonlSink};

pub(crate) async fn run(args: RunArgs, verbose: bool) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let repo_root = find_repo_root(&cwd);
    let test_file = absolutize(&cwd, &args.test_file);

    let suite = match load_test_file(&test_file, &repo_root) {
        Ok(s) => s,
        Err(e) => return Ok(config_error(&anyhow::Error::from(e))),
    };

    let runner = match build_runner(&args, &suite, &repo_root, &cwd) {
        Ok(r) => r,
        Err(e) => return Ok(config_error(&e)),
    };

    let selected = suite
        .cases
        .iter()
        .filter(|tc| args.test_id.as_deref().is_none_or(|id| tc.id == id))
        .count();
    if let (Some(id), 0) = (&args.test_id, selected) {
        return Ok(no_matching_test(id, &suite.path));
    }

    let out = match &args.out {
        Some(p) => absolutize(&cwd, p),
        None => default_output_path(
            &repo_root,
            &suite.stem(),
            chrono::Local::now().naive_local(),
        ),
    };
    let mut sink = match JsonlSink::open(out) {
        Ok(s) => s,
        Err(e) => return Ok(config_error(&anyhow::Error::from(e))),
    };

    tracing::info!(
        test_file = %suite.path.display(),
        results = %sink.path().display(),
        cases = selected,
        "run started"
    );

    let result = runner
        .run_suite(
            &suite.cases,
            &mut sink,
            interrupted(),
            default_progress_sink(selected),
        )
        .await;

    match result {
        Ok(report) => {
            print_summary(&report.records, verbose);
            eprintln!("\nResults: {}", sink.path().display());
            Ok(decide_exit_code(&report))
        }
        Err(SuiteError::NoMatchingTest(id)) => Ok(no_matching_test(&id, &suite.path)),
        Err(SuiteError::Sink { record, source }) => {
            eprintln!(
                "error: could not write result for '{}': {:#}",
                record.test_id,
                anyhow::Error::from(source)
            );
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("error: could not render unwritten record: {e}"),
            }
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn no_matching_test(id: &str, test_file: &std::path::Path) -> i32 {
    eprintln!(
        "config error: no test case with id '{id}' in {}",
        test_file.display()
    );
    exit_codes::CONFIG_ERROR
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; interrupt disabled");
        std::future::pending::<()>().await;
    }
}

pub(crate) fn decide_exit_code(report: &SuiteReport) -> i32 {
    if report.interrupted {
        exit_codes::INTERRUPTED
    } else if report.all_completed() {
        exit_codes::SUCCESS
    } else {
        exit_codes::CASES_INCOMPLETE
    }
}
