//! Poll-with-deadline for reply artifacts written by an external process.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// The file exists and is non-empty. Carries its raw bytes.
    Found(Vec<u8>),
    NotFoundYet,
    DeadlineExceeded,
}

/// Watches one path until it holds content or the deadline passes.
///
/// Knows nothing about retries: a caller that gets `DeadlineExceeded`
/// decides what that means.
#[derive(Debug, Clone)]
pub struct ReplyPoller {
    path: PathBuf,
    interval: Duration,
    deadline: Instant,
}

impl ReplyPoller {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// One look at the path. Content wins over an expired deadline.
    pub async fn check(&self) -> io::Result<PollStatus> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if !bytes.is_empty() => return Ok(PollStatus::Found(bytes)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if Instant::now() >= self.deadline {
            Ok(PollStatus::DeadlineExceeded)
        } else {
            Ok(PollStatus::NotFoundYet)
        }
    }

    /// Checks every `interval` until content appears (`Some`) or the deadline
    /// passes (`None`). The last sleep is shortened to land on the deadline.
    pub async fn wait(&self) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.check().await? {
                PollStatus::Found(bytes) => return Ok(Some(bytes)),
                PollStatus::DeadlineExceeded => return Ok(None),
                PollStatus::NotFoundYet => {
                    tokio::time::sleep(self.interval.min(self.remaining())).await;
                }
            }
        }
    }
}
