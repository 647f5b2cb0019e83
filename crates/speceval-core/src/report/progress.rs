//! Run progress. The runner emits done/total after each finished case; the
//! console layer consumes it through a sink.

use std::sync::Arc;

/// How many cases are finished out of the selected total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        self.done == self.total
    }
}

/// Called by the runner after every finished case. Implementations may
/// throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
