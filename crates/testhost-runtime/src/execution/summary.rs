//! Aggregated result of one run request.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use testhost_message::TestNodeState;
use testhost_types::ExitCode;

/// Concurrency gate slots observed once every test task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateUsage {
    pub capacity: usize,
    pub available: usize,
}

impl GateUsage {
    /// `true` when every slot was handed back.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.available == self.capacity
    }
}

/// Counts of terminal outcomes for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// Set when the run-wide token was cancelled.
    #[serde(default)]
    pub aborted: bool,
    /// Where the run report was written, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Gate state after the batch. Local to the process that ran it.
    #[serde(skip)]
    pub gate: Option<GateUsage>,
}

impl RunSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one terminal state. `Discovered` is ignored.
    pub fn record(&mut self, state: &TestNodeState) {
        match state {
            TestNodeState::Discovered => return,
            TestNodeState::Passed => self.passed += 1,
            TestNodeState::Failed { .. } => self.failed += 1,
            TestNodeState::Error { .. } => self.errored += 1,
            TestNodeState::Skipped { .. } => self.skipped += 1,
            TestNodeState::Cancelled => self.cancelled += 1,
            TestNodeState::Timeout { .. } => self.timed_out += 1,
        }
        self.total += 1;
    }

    /// Adds another summary's counts into this one.
    pub fn merge(&mut self, other: &RunSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.errored += other.errored;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
        self.timed_out += other.timed_out;
        self.duration_ms += other.duration_ms;
        self.aborted |= other.aborted;
        if other.report_path.is_some() {
            self.report_path.clone_from(&other.report_path);
        }
    }

    /// Failed, errored and timed-out tests.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failed + self.errored + self.timed_out
    }

    /// Tests whose body actually ran to a verdict.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.passed + self.failures()
    }

    /// Maps the summary to the process exit code.
    ///
    /// Abort wins over failures, failures over "nothing ran".
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.aborted {
            ExitCode::TestSessionAborted
        } else if self.failures() > 0 {
            ExitCode::AtLeastOneTestFailed
        } else if self.executed() == 0 {
            ExitCode::ZeroTests
        } else {
            ExitCode::Success
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total: {}, passed: {}, failed: {}, errored: {}, skipped: {}, cancelled: {}, timed out: {} ({}ms)",
            self.total,
            self.passed,
            self.failed,
            self.errored,
            self.skipped,
            self.cancelled,
            self.timed_out,
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_of(states: &[TestNodeState]) -> RunSummary {
        let mut summary = RunSummary::new();
        for state in states {
            summary.record(state);
        }
        summary
    }

    #[test]
    fn counts_terminal_states_only() {
        let summary = summary_of(&[
            TestNodeState::Discovered,
            TestNodeState::Passed,
            TestNodeState::Skipped { reason: None },
            TestNodeState::Timeout { after_ms: 1 },
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.timed_out, 1);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            summary_of(&[TestNodeState::Passed]).exit_code(),
            ExitCode::Success
        );
        assert_eq!(
            summary_of(&[TestNodeState::Passed, TestNodeState::Timeout { after_ms: 5 }])
                .exit_code(),
            ExitCode::AtLeastOneTestFailed
        );
        assert_eq!(
            summary_of(&[TestNodeState::Skipped { reason: None }]).exit_code(),
            ExitCode::ZeroTests
        );
        assert_eq!(RunSummary::new().exit_code(), ExitCode::ZeroTests);

        let mut aborted = summary_of(&[TestNodeState::Passed, TestNodeState::Cancelled]);
        aborted.aborted = true;
        assert_eq!(aborted.exit_code(), ExitCode::TestSessionAborted);
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = summary_of(&[TestNodeState::Passed]);
        let b = summary_of(&[TestNodeState::Passed, TestNodeState::Cancelled]);
        a.merge(&b);
        assert_eq!(a.total, 3);
        assert_eq!(a.passed, 2);
        assert_eq!(a.cancelled, 1);
    }

    #[test]
    fn serializes_for_transport() {
        let summary = summary_of(&[TestNodeState::Passed]);
        let json = serde_json::to_string(&summary).expect("serialize");
        let back: RunSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, summary);
    }

    #[test]
    fn gate_usage_stays_local() {
        let mut summary = summary_of(&[TestNodeState::Passed]);
        summary.gate = Some(GateUsage {
            capacity: 2,
            available: 2,
        });
        let json = serde_json::to_string(&summary).expect("serialize");
        assert!(!json.contains("gate"));
        let back: RunSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.gate, None);
        assert_eq!(back.passed, 1);
    }

    #[test]
    fn gate_idle_when_all_slots_returned() {
        assert!(GateUsage { capacity: 3, available: 3 }.is_idle());
        assert!(!GateUsage { capacity: 3, available: 2 }.is_idle());
    }
}
