use super::state::CaseMachine;
use crate::errors::SuiteError;
use crate::model::{
    AttemptOutcome, ExecutionResult, FinalStatus, ScoreRecord, TestCase, DEFAULT_GRADER,
};
use crate::prompt::PreparedPrompt;
use crate::providers::BackendAdapter;
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::ResultSink;
use crate::scoring::{score_answer, AspectScore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::Instrument;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_OVERRUN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Deadline handed to the backend for each attempt.
    pub attempt_timeout: Duration,
    /// Extra attempts after the first, spent only on timeouts.
    pub max_retries: u32,
    /// Run only the case with this id.
    pub test_id: Option<String>,
    /// Slack on top of `attempt_timeout` before an overrunning backend call
    /// is cut off and counted as a timeout.
    pub overrun_grace: Duration,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            test_id: None,
            overrun_grace: DEFAULT_OVERRUN_GRACE,
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    /// Records in completion order, as written to the sink.
    pub records: Vec<ScoreRecord>,
    /// Cases left out by the id filter.
    pub skipped: usize,
    /// The run was cancelled; the in-flight case has no record.
    pub interrupted: bool,
}

impl SuiteReport {
    pub fn count(&self, status: FinalStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn all_completed(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.status == FinalStatus::Completed)
    }
}

pub struct Runner {
    pub adapter: Arc<dyn BackendAdapter>,
    pub policy: RunPolicy,
}

impl Runner {
    pub fn new(adapter: Arc<dyn BackendAdapter>, policy: RunPolicy) -> Self {
        Self { adapter, policy }
    }

    /// Runs the selected cases one after another, writing one record per
    /// finished case. When `shutdown` resolves, the in-flight case is dropped
    /// without a record and the report comes back with `interrupted` set.
    pub async fn run_suite<F>(
        &self,
        cases: &[TestCase],
        sink: &mut dyn ResultSink,
        shutdown: F,
        progress: Option<ProgressSink>,
    ) -> Result<SuiteReport, SuiteError>
    where
        F: Future<Output = ()>,
    {
        let selected: Vec<&TestCase> = cases
            .iter()
            .filter(|tc| self.policy.test_id.as_deref().is_none_or(|id| tc.id == id))
            .collect();
        if let Some(id) = &self.policy.test_id {
            if selected.is_empty() {
                return Err(SuiteError::NoMatchingTest(id.clone()));
            }
        }

        let total = selected.len();
        let mut report = SuiteReport {
            skipped: cases.len() - total,
            ..SuiteReport::default()
        };
        tracing::info!(
            total,
            skipped = report.skipped,
            provider = self.adapter.provider_name(),
            model = self.adapter.model_name(),
            "starting run"
        );

        tokio::pin!(shutdown);
        for tc in selected {
            let span = tracing::info_span!("test_case", test_id = %tc.id);
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::warn!(test_id = %tc.id, "run interrupted; abandoning in-flight case");
                    report.interrupted = true;
                    break;
                }
                result = self.execute(tc).instrument(span) => result,
            };

            let record = self.score(tc, &result);
            if let Err(source) = sink.write(&record) {
                return Err(SuiteError::Sink {
                    record: Box::new(record),
                    source,
                });
            }
            report.records.push(record);

            if let Some(sink) = &progress {
                sink(ProgressEvent {
                    done: report.records.len(),
                    total,
                });
            }
        }

        Ok(report)
    }

    /// Drives one case through the retry policy. The prompt is prepared
    /// afresh for every attempt.
    pub async fn execute(&self, tc: &TestCase) -> ExecutionResult {
        let mut machine = CaseMachine::new(&tc.id, self.policy.max_retries);
        while let Some(attempt) = machine.dispatch() {
            let prompt = PreparedPrompt::from_test_case(tc);
            let started = Instant::now();
            let outcome = self.dispatch_bounded(&prompt).await;
            let elapsed = started.elapsed();
            tracing::debug!(
                attempt,
                outcome = ?outcome.kind(),
                elapsed_ms = elapsed.as_millis() as u64,
                "attempt finished"
            );
            machine.observe(outcome, elapsed);
        }

        let result = machine.finish();
        match &result.failure {
            Some(failure) => tracing::warn!(
                status = %result.final_status,
                attempts = result.attempts_used,
                error = %failure,
                "case did not complete"
            ),
            None => tracing::info!(
                status = %result.final_status,
                attempts = result.attempts_used,
                "case completed"
            ),
        }
        result
    }

    async fn dispatch_bounded(&self, prompt: &PreparedPrompt) -> AttemptOutcome {
        let deadline = self.policy.attempt_timeout;
        let hard_limit = deadline.saturating_add(self.policy.overrun_grace);
        match timeout(hard_limit, self.adapter.dispatch(prompt, deadline)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    provider = self.adapter.provider_name(),
                    limit_ms = hard_limit.as_millis() as u64,
                    "backend overran its deadline; counting as timeout"
                );
                AttemptOutcome::Timeout
            }
        }
    }

    /// Builds the record for a finished case. Cases without an accepted
    /// answer score zero with every aspect missed.
    pub fn score(&self, tc: &TestCase, result: &ExecutionResult) -> ScoreRecord {
        if tc.grader != DEFAULT_GRADER {
            tracing::warn!(
                test_id = %tc.id,
                grader = %tc.grader,
                "grader not available; scoring with the heuristic grader"
            );
        }

        let expected = tc.expected_answer.reveal();
        let (aspects, answer) = match (&result.final_status, &result.answer) {
            (FinalStatus::Completed, Some(answer)) => {
                (score_answer(answer, expected), answer.clone())
            }
            _ => (AspectScore::all_missed(expected), String::new()),
        };

        ScoreRecord {
            test_id: result.test_id.clone(),
            score: aspects.score,
            hits: aspects.hits,
            misses: aspects.misses,
            expected_aspect_count: aspects.expected_aspect_count,
            hit_aspects: aspects.hit_aspects,
            missed_aspects: aspects.missed_aspects,
            model_answer: answer,
            provider: self.adapter.provider_name().to_string(),
            model: self.adapter.model_name().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            status: result.final_status,
            attempts_used: result.attempts_used,
            attempts: result.attempts.clone(),
            error: result.failure.clone(),
        }
    }
}
