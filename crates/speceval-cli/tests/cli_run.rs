use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SUITE: &str = r#"
testcases:
  - id: cleanup
    outcome: Points out the missing logging
    messages:
      - role: user
        content:
          - type: text
            value: |
              Review the cleanup path of this handler.
              ```python
              try:
                  work()
              finally:
                  close()
              ```
          - type: file
            value: prompts/python.instructions.md
      - role: assistant
        content: |
          - uses try/finally
          - logs the exception
  - id: naming
    messages:
      - role: user
        content: Suggest a better name for `tmp2`.
      - role: assistant
        content: |
          1. descriptive name
"#;

/// A throwaway repository with a test file and a guideline.
fn repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    write(dir.path(), "evals/review.yaml", SUITE);
    write(
        dir.path(),
        "prompts/python.instructions.md",
        "Prefer context managers.",
    );
    dir
}

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(&p, content).unwrap();
    p
}

fn speceval(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_speceval"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is one JSON object"))
        .collect()
}

#[test]
fn dry_run_writes_one_record_per_case() {
    let dir = repo();
    let out = dir.path().join("out/results.jsonl");

    speceval(dir.path())
        .args(["run", "evals/review.yaml", "--dry-run", "--out"])
        .arg(&out)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("Completed: 2, Timed out: 0, Failed: 0"));

    let records = read_jsonl(&out);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["test_id"], "cleanup");
    assert_eq!(records[1]["test_id"], "naming");
    for r in &records {
        assert_eq!(r["provider"], "mock");
        assert_eq!(r["status"], "completed");
        assert!(r.get("error").is_none());
        let hits = r["hits"].as_u64().unwrap();
        let misses = r["misses"].as_u64().unwrap();
        assert_eq!(hits + misses, r["expected_aspect_count"].as_u64().unwrap());
    }
    assert_eq!(records[0]["expected_aspect_count"], 2);
    assert!(records[0]["model_answer"]
        .as_str()
        .unwrap()
        .starts_with("mock answer for cleanup"));
}

#[test]
fn default_log_lands_under_results_dir() {
    let dir = repo();
    speceval(dir.path())
        .args(["run", "evals/review.yaml", "--dry-run", "--test-id", "naming"])
        .assert()
        .success();

    let results: Vec<_> = fs::read_dir(dir.path().join(".speceval/results"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(results.len(), 1);
    let name = results[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("review_") && name.ends_with(".jsonl"), "{name}");
    let records = read_jsonl(&results[0]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["test_id"], "naming");
}

#[test]
fn unknown_test_id_is_a_config_error() {
    let dir = repo();
    speceval(dir.path())
        .args(["run", "evals/review.yaml", "--dry-run", "--test-id", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no test case with id 'nope'"));
    assert!(!dir.path().join(".speceval/results").exists());
}

#[test]
fn missing_test_file_is_a_config_error() {
    let dir = repo();
    speceval(dir.path())
        .args(["run", "evals/absent.yaml", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read test file"));
}

#[test]
fn missing_targets_file_without_dry_run_is_a_config_error() {
    let dir = repo();
    speceval(dir.path())
        .args(["run", "evals/review.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("pass --targets or --dry-run"));
}

#[test]
fn mock_target_with_fixed_response_scores_every_aspect() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        r#"
- name: default
  provider: mock
  settings:
    response: "It uses try/finally and logs the exception with a descriptive name."
"#,
    );
    let out = dir.path().join("scores.jsonl");

    speceval(dir.path())
        .args(["run", "evals/review.yaml", "--out"])
        .arg(&out)
        .assert()
        .success();

    let records = read_jsonl(&out);
    assert_eq!(records[0]["score"], 1.0);
    assert_eq!(records[0]["hits"], 2);
    assert_eq!(records[1]["score"], 1.0);
}

#[test]
fn unset_variable_in_target_is_reported() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        r#"
- name: claude
  provider: anthropic
  settings:
    api_key: ${SPECEVAL_TEST_UNSET_KEY}
    model: claude-test
"#,
    );

    speceval(dir.path())
        .env_remove("SPECEVAL_TEST_UNSET_KEY")
        .args(["run", "evals/review.yaml", "--target", "claude"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SPECEVAL_TEST_UNSET_KEY"));
}

#[test]
fn unknown_target_lists_available_ones() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        "- name: offline\n  provider: mock\n",
    );
    speceval(dir.path())
        .args(["run", "evals/review.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("target 'default' not found (available: offline)"));
}

#[cfg(unix)]
#[test]
fn failing_agent_launch_marks_cases_failed() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        r#"
- name: default
  provider: vscode
  settings:
    workspace: .
    command: "false"
    poll_interval_ms: 50
"#,
    );
    let out = dir.path().join("scores.jsonl");

    speceval(dir.path())
        .args(["run", "evals/review.yaml", "--test-id", "naming", "--out"])
        .arg(&out)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Not completed: naming"));

    let records = read_jsonl(&out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "failed");
    assert_eq!(records[0]["score"], 0.0);
    assert_eq!(records[0]["attempts_used"], 1);
    assert_eq!(records[0]["error"]["kind"], "launch");
}

#[test]
fn validate_reports_cases_and_target() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        "- name: default\n  provider: mock\n",
    );
    speceval(dir.path())
        .args(["validate", "evals/review.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 test case(s)"))
        .stdout(predicate::str::contains("cleanup"))
        .stdout(predicate::str::contains("1 guideline(s)"))
        .stdout(predicate::str::contains("target default (mock)"));
}

#[test]
fn targets_check_flags_unresolvable_entries() {
    let dir = repo();
    write(
        dir.path(),
        ".speceval/targets.yaml",
        r#"
- name: offline
  provider: mock
- name: azure
  provider: azure
  settings:
    endpoint: https://example.invalid
    deployment: gpt
"#,
    );

    speceval(dir.path())
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("offline"))
        .stdout(predicate::str::contains("azure"));

    speceval(dir.path())
        .args(["targets", "--check"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("missing required setting 'api_key'"));
}
