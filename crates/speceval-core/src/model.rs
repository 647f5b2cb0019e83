use crate::errors::FailureDetail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One piece of the prompt, kept in the order it appeared in the test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptFragment {
    Text {
        text: String,
    },
    Code {
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        body: String,
    },
    /// A non-guideline file inlined into the task.
    File {
        path: String,
        content: String,
    },
}

/// An instruction file the backend must read before answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guideline {
    pub path: PathBuf,
    pub content: String,
}

/// The expected answer of a test case.
///
/// Deliberately not `Serialize` and redacted in `Debug`: only the scoring
/// engine may read it, and it must never end up in an outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct HiddenAnswer(String);

impl HiddenAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub(crate) fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HiddenAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HiddenAnswer(<redacted>)")
    }
}

pub const DEFAULT_GRADER: &str = "heuristic";

#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: String,
    /// Free-form description of the desired behavior. Never sent to a backend.
    pub outcome: Option<String>,
    pub prompt: Vec<PromptFragment>,
    pub guidelines: Vec<Guideline>,
    pub grader: String,
    pub expected_answer: HiddenAnswer,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        prompt: Vec<PromptFragment>,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            outcome: None,
            prompt,
            guidelines: Vec::new(),
            grader: DEFAULT_GRADER.to_string(),
            expected_answer: HiddenAnswer::new(expected_answer),
        }
    }

    pub fn with_guideline(mut self, guideline: Guideline) -> Self {
        self.guidelines.push(guideline);
        self
    }

    /// Number of scorable aspects in the expected answer.
    pub fn expected_aspect_count(&self) -> usize {
        crate::scoring::extract_aspects(self.expected_answer.reveal()).len()
    }
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    /// No answer within the attempt deadline. The only retryable outcome.
    Timeout,
    Error(FailureDetail),
}

impl AttemptOutcome {
    pub fn kind(&self) -> AttemptKind {
        match self {
            AttemptOutcome::Success(_) => AttemptKind::Success,
            AttemptOutcome::Timeout => AttemptKind::Timeout,
            AttemptOutcome::Error(_) => AttemptKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Success,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_no: u32,
    pub outcome: AttemptKind,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalStatus {
    Completed,
    TimedOut,
    Failed,
}

impl FinalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalStatus::Completed => "completed",
            FinalStatus::TimedOut => "timed-out",
            FinalStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one test case, produced by
/// [`crate::engine::state::CaseMachine::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub test_id: String,
    pub answer: Option<String>,
    pub attempts_used: u32,
    pub final_status: FinalStatus,
    pub attempts: Vec<AttemptRecord>,
    pub failure: Option<FailureDetail>,
}

/// One line of the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub test_id: String,
    pub score: f64,
    pub hits: usize,
    pub misses: usize,
    pub expected_aspect_count: usize,
    pub hit_aspects: Vec<String>,
    pub missed_aspects: Vec<String>,
    pub model_answer: String,
    pub provider: String,
    pub model: String,
    pub timestamp: String,
    pub status: FinalStatus,
    pub attempts_used: u32,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}
