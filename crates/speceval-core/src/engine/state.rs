//! Per-case attempt state machine.
//!
//! ```text
//! Pending -> Dispatched -> Accepted
//!                      -> RetryScheduled -> Dispatched
//!                      -> Exhausted
//! ```
//!
//! Only `Timeout` schedules a retry. `Error` exhausts the case immediately,
//! whatever budget is left.

use crate::errors::{FailureDetail, RunErrorKind};
use crate::model::{AttemptOutcome, AttemptRecord, ExecutionResult, FinalStatus};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Dispatched { attempt: u32 },
    RetryScheduled { attempt: u32 },
    Accepted,
    Exhausted,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Accepted | AttemptState::Exhausted)
    }
}

/// Owns the mutable state of one test case while it runs.
#[derive(Debug)]
pub struct CaseMachine {
    test_id: String,
    max_attempts: u32,
    state: AttemptState,
    transitions: Vec<AttemptState>,
    attempts: Vec<AttemptRecord>,
    answer: Option<String>,
    final_status: Option<FinalStatus>,
    failure: Option<FailureDetail>,
}

impl CaseMachine {
    pub fn new(test_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            test_id: test_id.into(),
            max_attempts: max_retries.saturating_add(1),
            state: AttemptState::Pending,
            transitions: vec![AttemptState::Pending],
            attempts: Vec::new(),
            answer: None,
            final_status: None,
            failure: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Every state entered so far, starting with `Pending`.
    pub fn transitions(&self) -> &[AttemptState] {
        &self.transitions
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Moves to `Dispatched` and returns the attempt number, or `None` when
    /// the case is not waiting for a dispatch.
    pub fn dispatch(&mut self) -> Option<u32> {
        let attempt = match self.state {
            AttemptState::Pending => 1,
            AttemptState::RetryScheduled { attempt } => attempt,
            _ => return None,
        };
        self.enter(AttemptState::Dispatched { attempt });
        Some(attempt)
    }

    /// Applies the outcome of the in-flight attempt.
    pub fn observe(&mut self, outcome: AttemptOutcome, elapsed: Duration) -> AttemptState {
        let AttemptState::Dispatched { attempt } = self.state else {
            tracing::error!(
                test_id = %self.test_id,
                state = ?self.state,
                "attempt outcome observed outside of a dispatch; ignored"
            );
            return self.state;
        };

        let kind = outcome.kind();
        let message = match &outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::Timeout => Some("no answer before deadline".to_string()),
            AttemptOutcome::Error(detail) => Some(detail.render(false)),
        };
        self.attempts.push(AttemptRecord {
            attempt_no: attempt,
            outcome: kind,
            duration_ms: elapsed.as_millis().min(u128::from(u64::MAX)) as u64,
            message,
        });

        let next = match outcome {
            AttemptOutcome::Success(answer) => {
                self.answer = Some(answer);
                self.final_status = Some(FinalStatus::Completed);
                AttemptState::Accepted
            }
            AttemptOutcome::Timeout if attempt < self.max_attempts => {
                AttemptState::RetryScheduled {
                    attempt: attempt + 1,
                }
            }
            AttemptOutcome::Timeout => {
                self.final_status = Some(FinalStatus::TimedOut);
                self.failure = Some(FailureDetail::provider_timeout_exhausted(attempt));
                AttemptState::Exhausted
            }
            AttemptOutcome::Error(detail) => {
                self.final_status = Some(FinalStatus::Failed);
                self.failure = Some(detail);
                AttemptState::Exhausted
            }
        };
        self.enter(next);
        next
    }

    /// Finalizes the case. A machine that never reached a terminal state is
    /// reported as failed.
    pub fn finish(self) -> ExecutionResult {
        let (final_status, failure) = match self.final_status {
            Some(status) => (status, self.failure),
            None => (
                FinalStatus::Failed,
                Some(FailureDetail::new(
                    RunErrorKind::Other,
                    format!("case finished in non-terminal state {:?}", self.state),
                )),
            ),
        };
        ExecutionResult {
            attempts_used: self.attempts.len() as u32,
            test_id: self.test_id,
            answer: self.answer,
            final_status,
            attempts: self.attempts,
            failure,
        }
    }

    fn enter(&mut self, next: AttemptState) {
        tracing::trace!(test_id = %self.test_id, from = ?self.state, to = ?next, "transition");
        self.state = next;
        self.transitions.push(next);
    }
}
