//! Test nodes and their state.
//!
//! A [`TestNode`] is one discoverable/runnable test. Its identity is
//! immutable; its [`TestNodeState`] is a closed variant that moves from
//! `Discovered` to exactly one terminal outcome per run request.
//!
//! ```text
//! Discovered ──► Passed
//!            ├─► Failed(exception, explanation)
//!            ├─► Error(exception)
//!            ├─► Skipped(reason)
//!            ├─► Cancelled
//!            └─► Timeout(after)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use testhost_types::TestNodeUid;

/// Details of what a test body raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Type or category of the failure (e.g. "assertion", "panic").
    pub type_name: String,
    /// Human-readable message.
    pub message: String,
    /// Expected value of a failed assertion, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Actual value of a failed assertion, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl ExceptionInfo {
    /// Creates exception details without expected/actual values.
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Creates details for an assertion mismatch.
    ///
    /// The message is `Expected: <expected>, Actual: <actual>`.
    ///
    /// ```
    /// use testhost_message::ExceptionInfo;
    ///
    /// let info = ExceptionInfo::assertion("X", "Y");
    /// assert_eq!(info.message, "Expected: X, Actual: Y");
    /// ```
    #[must_use]
    pub fn assertion(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        let expected = expected.into();
        let actual = actual.into();
        Self {
            type_name: "assertion".to_string(),
            message: format!("Expected: {}, Actual: {}", expected, actual),
            expected: Some(expected),
            actual: Some(actual),
        }
    }
}

/// State property of a test node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TestNodeState {
    /// Found by discovery, not executed.
    Discovered,
    /// Test body returned normally.
    Passed,
    /// A recognized assertion failed.
    Failed {
        exception: Option<ExceptionInfo>,
        explanation: String,
    },
    /// Statically skipped, body never ran.
    Skipped { reason: Option<String> },
    /// Any other failure, including fixture and infrastructure problems.
    Error { exception: ExceptionInfo },
    /// Cancellation was signaled before or during the body.
    Cancelled,
    /// The per-test deadline elapsed.
    Timeout { after_ms: u64 },
}

impl TestNodeState {
    /// Returns `true` for every state except `Discovered`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Discovered)
    }

    /// Returns `true` for outcomes that fail the run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Error { .. } | Self::Timeout { .. }
        )
    }

    /// Returns a short lowercase label (`passed`, `failed`, ...).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Error { .. } => "error",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Returns the failure explanation, if the state carries one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { explanation, .. } => Some(explanation),
            Self::Error { exception } => Some(&exception.message),
            Self::Skipped { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

/// One discoverable/runnable test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    /// Framework-assigned identity.
    pub uid: TestNodeUid,
    /// Name shown by reporters.
    pub display_name: String,
    /// Current state.
    pub state: TestNodeState,
    /// Wall-clock duration of the body, for executed tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Free-form framework metadata (traits, categories, source location).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl TestNode {
    /// Creates a node in the `Discovered` state.
    #[must_use]
    pub fn discovered(uid: TestNodeUid, display_name: impl Into<String>) -> Self {
        Self {
            uid,
            display_name: display_name.into(),
            state: TestNodeState::Discovered,
            duration_ms: None,
            properties: BTreeMap::new(),
        }
    }

    /// Returns a copy of this node carrying a new state.
    #[must_use]
    pub fn with_state(mut self, state: TestNodeState) -> Self {
        self.state = state;
        self
    }

    /// Sets the measured duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Adds a metadata property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_is_not_terminal() {
        assert!(!TestNodeState::Discovered.is_terminal());
        assert!(TestNodeState::Passed.is_terminal());
        assert!(TestNodeState::Cancelled.is_terminal());
    }

    #[test]
    fn failure_classification() {
        let failed = TestNodeState::Failed {
            exception: Some(ExceptionInfo::assertion("1", "2")),
            explanation: "Expected: 1, Actual: 2".into(),
        };
        assert!(failed.is_failure());
        assert!(TestNodeState::Timeout { after_ms: 10 }.is_failure());
        assert!(!TestNodeState::Skipped { reason: None }.is_failure());
        assert!(!TestNodeState::Cancelled.is_failure());
        assert_eq!(failed.message(), Some("Expected: 1, Actual: 2"));
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&TestNodeState::Timeout { after_ms: 5 }).expect("ser");
        assert_eq!(json, r#"{"state":"timeout","after_ms":5}"#);
    }

    #[test]
    fn node_builders() {
        let node = TestNode::discovered(TestNodeUid::new("t1"), "first")
            .with_state(TestNodeState::Passed)
            .with_duration_ms(12)
            .with_property("category", "fast");

        assert_eq!(node.state, TestNodeState::Passed);
        assert_eq!(node.duration_ms, Some(12));
        assert_eq!(node.properties.get("category").map(String::as_str), Some("fast"));
    }
}
