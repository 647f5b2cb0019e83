use crate::model::ScoreRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    /// Provider answered, but with an error status or an unusable body.
    Provider,
    Network,
    /// The external agent process could not be started or exited non-zero.
    Launch,
    /// A reply artifact exists but could not be read as an answer.
    ReplyParse,
    Config,
    Io,
    /// Retry budget consumed by timeouts.
    Timeout,
    Other,
}

impl RunErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunErrorKind::Provider => "provider",
            RunErrorKind::Network => "network",
            RunErrorKind::Launch => "launch",
            RunErrorKind::ReplyParse => "reply_parse",
            RunErrorKind::Config => "config",
            RunErrorKind::Io => "io",
            RunErrorKind::Timeout => "timeout",
            RunErrorKind::Other => "other",
        }
    }
}

/// Diagnostic payload of a failed attempt.
///
/// `message` is what non-verbose output shows; `causes` holds the remaining
/// error chain and is only rendered in verbose mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: RunErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl FailureDetail {
    pub fn new(kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            causes: Vec::new(),
            provider: None,
            status: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Flattens an anyhow chain: the outermost context becomes the message,
    /// everything underneath becomes `causes`.
    pub fn from_anyhow(kind: RunErrorKind, err: &anyhow::Error) -> Self {
        let mut chain = err.chain().map(|e| e.to_string());
        let message = chain.next().unwrap_or_else(|| "unknown error".to_string());
        Self {
            kind,
            message,
            causes: chain.collect(),
            provider: None,
            status: None,
        }
    }

    pub fn provider_timeout_exhausted(attempts: u32) -> Self {
        Self::new(
            RunErrorKind::Timeout,
            format!("agent timeout after {} attempt(s)", attempts),
        )
    }

    /// `[kind] message`, plus one `caused by:` line per cause when verbose.
    pub fn render(&self, verbose: bool) -> String {
        let mut out = format!("[{}] {}", self.kind.as_str(), self.message);
        if verbose {
            if let Some(status) = self.status {
                out.push_str(&format!("\n  status: {}", status));
            }
            if let Some(provider) = &self.provider {
                out.push_str(&format!("\n  provider: {}", provider));
            }
            for cause in &self.causes {
                out.push_str(&format!("\n  caused by: {}", cause));
            }
        }
        out
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read test file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("duplicate test case id '{0}'")]
    DuplicateId(String),
    #[error("test case '{test_id}' has no assistant message holding the expected answer")]
    MissingExpected { test_id: String },
    #[error("test case '{test_id}' references '{reference}', which could not be found")]
    MissingFile { test_id: String, reference: String },
    #[error("failed to read '{}' referenced by test case '{test_id}'", .path.display())]
    ReadFragment {
        test_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to read targets file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse targets file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("target '{name}' not found (available: {available})")]
    NotFound { name: String, available: String },
    #[error("target '{target}' uses unknown provider '{provider}'")]
    UnknownProvider { target: String, provider: String },
    #[error("target '{target}': setting '{key}' references unset environment variable '{var}'")]
    MissingEnv {
        target: String,
        key: String,
        var: String,
    },
    #[error("target '{target}': missing required setting '{key}'")]
    MissingSetting { target: String, key: String },
    #[error("target '{target}': invalid value for setting '{key}': {message}")]
    InvalidSetting {
        target: String,
        key: String,
        message: String,
    },
    #[error("target '{target}': failed to build HTTP client")]
    Client {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write result log {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize result record")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("no test case matches id '{0}'")]
    NoMatchingTest(String),
    /// The sink rejected a record. The record is kept for diagnostic output.
    #[error("result sink failed while writing '{}'", .record.test_id)]
    Sink {
        record: Box<ScoreRecord>,
        #[source]
        source: SinkError,
    },
}
