//! Run report.
//!
//! A plain-text buffer with one line per terminal test outcome. Concurrent
//! test tasks append under a mutex; the coordinator writes it to the
//! results directory once every task has finished.

use parking_lot::Mutex;
use std::path::Path;
use testhost_message::TestNodeState;
use testhost_types::TestNodeUid;

/// Formats the report line for one outcome.
#[must_use]
pub fn report_line(uid: &TestNodeUid, state: &TestNodeState) -> String {
    match state {
        TestNodeState::Discovered => format!("Test {} discovered", uid),
        TestNodeState::Passed => format!("Test {} passed", uid),
        TestNodeState::Failed { explanation, .. } => {
            format!("Test {} failed: {}", uid, explanation)
        }
        TestNodeState::Skipped { .. } => format!("Test {} skipped", uid),
        TestNodeState::Error { exception } => format!(
            "Test {} errored: {}: {}",
            uid, exception.type_name, exception.message
        ),
        TestNodeState::Cancelled => format!("Test {} cancelled", uid),
        TestNodeState::Timeout { after_ms } => {
            format!("Test {} timed out after {}ms", uid, after_ms)
        }
    }
}

/// Accumulates report lines from concurrent tasks.
#[derive(Debug, Default)]
pub struct RunReport {
    buffer: Mutex<String>,
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the line for `uid` in `state`.
    pub fn record(&self, uid: &TestNodeUid, state: &TestNodeState) {
        let line = report_line(uid, state);
        let mut buffer = self.buffer.lock();
        buffer.push_str(&line);
        buffer.push('\n');
    }

    /// Current contents.
    #[must_use]
    pub fn text(&self) -> String {
        self.buffer.lock().clone()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.buffer.lock().lines().count()
    }

    /// Writes the report to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = self.text();
        tokio::fs::write(path, text).await
    }
}
