pub mod console;
pub mod jsonl;
pub mod progress;
pub mod summary;

use crate::errors::SinkError;
use crate::model::ScoreRecord;

pub use jsonl::{default_output_path, JsonlSink};
pub use summary::SummaryStats;

/// Destination for finished records. One call per finished case, in
/// completion order.
pub trait ResultSink {
    fn write(&mut self, record: &ScoreRecord) -> Result<(), SinkError>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ScoreRecord>,
}

impl ResultSink for MemorySink {
    fn write(&mut self, record: &ScoreRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}
