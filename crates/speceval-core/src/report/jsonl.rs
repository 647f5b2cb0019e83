use super::ResultSink;
use crate::errors::SinkError;
use crate::model::ScoreRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RESULTS_DIR: &str = "results";

/// Append-only JSON Lines log. Each record is written as one complete line
/// with a single `write_all`.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it and its parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn write(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(test_id = %record.test_id, path = %self.path.display(), "record written");
        Ok(())
    }
}

/// `<repo>/.speceval/results/<stem>_<YYYYMMDD_HHMMSS>.jsonl`
pub fn default_output_path(repo_root: &Path, stem: &str, at: chrono::NaiveDateTime) -> PathBuf {
    repo_root
        .join(crate::targets::TARGETS_DIR)
        .join(RESULTS_DIR)
        .join(format!("{}_{}.jsonl", stem, at.format("%Y%m%d_%H%M%S")))
}
