use crate::model::{FinalStatus, ScoreRecord};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::summary::SummaryStats;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// --- Progress N/M (throttled, completion order) ---

/// Single progress line. Deterministic, unit-testable.
#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Running test {}/{}...", done, total)
}

/// Minimum interval between progress updates.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large suites, emit at most every this many cases (10% steps).
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

/// Throttled progress sink printing to stderr. `None` for a single case.
/// The final update is always printed.
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let last_emit: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut last = last_emit.lock().unwrap_or_else(|e| e.into_inner());
            let on_step = ev.done % step == 0 || ev.done == 1;
            let interval_ok = (*last).is_none_or(|t| {
                now.saturating_duration_since(t) >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
            });
            let ok = ev.is_final() || (on_step && interval_ok);
            if ok {
                *last = Some(now);
            }
            ok
        };
        if should_emit {
            eprintln!("{}", format_progress_line(ev.done, ev.total));
        }
    }))
}

fn status_icon(status: FinalStatus) -> &'static str {
    match status {
        FinalStatus::Completed => "✅",
        FinalStatus::TimedOut => "⏱️ ",
        FinalStatus::Failed => "❌",
    }
}

/// One line per case, e.g. `✅ review-1             0.50  hits 1/2`.
pub fn format_case_line(r: &ScoreRecord) -> String {
    let attempts = if r.attempts_used > 1 {
        format!("  ({} attempts)", r.attempts_used)
    } else {
        String::new()
    };
    format!(
        "{} {:<20} {:.2}  hits {}/{}{}",
        status_icon(r.status),
        r.test_id,
        r.score,
        r.hits,
        r.expected_aspect_count,
        attempts
    )
}

/// The full end-of-run summary as printed by [`print_summary`].
pub fn format_summary(records: &[ScoreRecord], verbose: bool) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format_case_line(r));
        out.push('\n');
        if let Some(err) = &r.error {
            out.push_str(&format!("    {}\n", err.render(verbose).replace('\n', "\n    ")));
        }
    }

    let Some(stats) = SummaryStats::from_records(records) else {
        out.push_str("\nNo test cases were run.\n");
        return out;
    };

    out.push_str(&format!(
        "\nSummary ({} / {}):\n",
        stats.provider, stats.model
    ));
    out.push_str(&format!("  Total cases:  {}\n", stats.total_cases));
    out.push_str(&format!("  Mean score:   {:.3}\n", stats.mean_score));
    out.push_str(&format!("  Median score: {:.3}\n", stats.median_score));
    out.push_str(&format!(
        "  Min / max:    {:.3} / {:.3}\n",
        stats.min_score, stats.max_score
    ));
    if let Some(sd) = stats.std_deviation {
        out.push_str(&format!("  Std dev:      {:.3}\n", sd));
    }
    out.push_str(&format!(
        "  Completed: {}, Timed out: {}, Failed: {}\n",
        stats.completed, stats.timed_out, stats.failed
    ));

    let incomplete: Vec<&str> = records
        .iter()
        .filter(|r| r.status != FinalStatus::Completed)
        .map(|r| r.test_id.as_str())
        .collect();
    if !incomplete.is_empty() {
        out.push_str(&format!("  Not completed: {}\n", incomplete.join(", ")));
    }
    out
}

pub fn print_summary(records: &[ScoreRecord], verbose: bool) {
    eprintln!();
    eprint!("{}", format_summary(records, verbose));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FailureDetail, RunErrorKind};

    fn rec(id: &str, score: f64, status: FinalStatus) -> ScoreRecord {
        ScoreRecord {
            test_id: id.into(),
            score,
            hits: 1,
            misses: 1,
            expected_aspect_count: 2,
            hit_aspects: vec![],
            missed_aspects: vec![],
            model_answer: String::new(),
            provider: "mock".into(),
            model: "mock".into(),
            timestamp: String::new(),
            status,
            attempts_used: 1,
            attempts: vec![],
            error: None,
        }
    }

    #[test]
    fn progress_line_format() {
        assert_eq!(format_progress_line(3, 10), "Running test 3/10...");
    }

    #[test]
    fn progress_step_scales_with_total() {
        assert_eq!(progress_step(5), 1);
        assert_eq!(progress_step(10), 1);
        assert_eq!(progress_step(100), 10);
    }

    #[test]
    fn no_progress_sink_for_single_case() {
        assert!(default_progress_sink(1).is_none());
        assert!(default_progress_sink(2).is_some());
    }

    #[test]
    fn summary_lists_incomplete_cases_and_hides_causes_unless_verbose() {
        let mut failed = rec("bad", 0.0, FinalStatus::Failed);
        failed.error = Some(
            FailureDetail::new(RunErrorKind::Network, "request to azure failed")
                .with_cause("connection refused"),
        );
        let records = vec![rec("good", 0.5, FinalStatus::Completed), failed];

        let quiet = format_summary(&records, false);
        assert!(quiet.contains("[network] request to azure failed"));
        assert!(!quiet.contains("connection refused"));
        assert!(quiet.contains("Not completed: bad"));
        assert!(quiet.contains("Completed: 1, Timed out: 0, Failed: 1"));

        let loud = format_summary(&records, true);
        assert!(loud.contains("caused by: connection refused"));
    }

    #[test]
    fn empty_run_summary() {
        assert!(format_summary(&[], false).contains("No test cases were run."));
    }
}
