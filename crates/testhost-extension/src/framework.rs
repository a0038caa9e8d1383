//! The test framework role.
//!
//! The host never inspects test code. A framework turns its own notion of
//! tests into [`TestCase`] values during discovery and runs one case at a
//! time when asked; everything else (scheduling, classification,
//! reporting) belongs to the host.
//!
//! # Execution contract
//!
//! ```text
//! create_session ─► discover ─► execute(case, token) × N ─► close_session
//!                                   │
//!                                   ├─ Ok(())                   ⇒ Passed
//!                                   ├─ Err(Assertion{..})       ⇒ Failed
//!                                   ├─ Err(Exception{..})       ⇒ Error
//!                                   ├─ Err(Infrastructure(..))  ⇒ Error
//!                                   └─ Err(Cancelled)           ⇒ Cancelled
//! ```
//!
//! `execute` is called concurrently from many tasks. Deadlines are enforced
//! by the host; the body only needs to watch its [`CancellationToken`] if it
//! wants to stop early.

use crate::{Capabilities, Extension, ExtensionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use testhost_types::{SessionUid, TestNodeUid};
use tokio_util::sync::CancellationToken;

/// One runnable test as described by its framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Framework-assigned identity.
    pub uid: TestNodeUid,
    /// Name shown by reporters.
    pub display_name: String,
    /// Static skip marker. A skipped case never runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipMarker>,
    /// Per-test deadline, overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_ms")]
    pub timeout: Option<Duration>,
    /// Free-form metadata copied onto the published node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Marks a test as statically skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipMarker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TestCase {
    /// Creates a runnable case.
    #[must_use]
    pub fn new(uid: impl Into<TestNodeUid>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            skip: None,
            timeout: None,
            properties: BTreeMap::new(),
        }
    }

    /// Marks the case as skipped.
    #[must_use]
    pub fn skipped(mut self, reason: Option<String>) -> Self {
        self.skip = Some(SkipMarker { reason });
        self
    }

    /// Sets a per-test deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a metadata property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns `true` when the case carries a skip marker.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }
}

/// What a test body raised.
///
/// The host maps each variant to a terminal node state with a single pure
/// classification function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFailure {
    /// A recognised assertion failed.
    Assertion {
        message: Option<String>,
        expected: Option<String>,
        actual: Option<String>,
    },
    /// Any other failure raised by the body.
    Exception { type_name: String, message: String },
    /// The body observed cancellation and stopped.
    Cancelled,
    /// The framework could not prepare the test (fixture, lookup, setup).
    Infrastructure(String),
}

impl TestFailure {
    /// An assertion mismatch with expected and actual values.
    #[must_use]
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Assertion {
            message: None,
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }

    /// An assertion failure with only a message.
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: Some(message.into()),
            expected: None,
            actual: None,
        }
    }

    /// A non-assertion failure.
    #[must_use]
    pub fn exception(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exception {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assertion {
                expected: Some(expected),
                actual: Some(actual),
                ..
            } => write!(f, "Expected: {}, Actual: {}", expected, actual),
            Self::Assertion {
                message: Some(message),
                ..
            } => f.write_str(message),
            Self::Assertion { .. } => f.write_str("assertion failed"),
            Self::Exception { type_name, message } => write!(f, "{}: {}", type_name, message),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Infrastructure(message) => write!(f, "infrastructure: {}", message),
        }
    }
}

/// Restricts discovery to matching tests.
///
/// Only forwarded to frameworks advertising
/// [`Capability::Filtering`](crate::Capability::Filtering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFilter {
    pattern: String,
}

impl TestFilter {
    /// Creates a substring filter.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// The raw pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if the uid or display name contains the pattern.
    #[must_use]
    pub fn matches(&self, case: &TestCase) -> bool {
        case.uid.as_str().contains(&self.pattern) || case.display_name.contains(&self.pattern)
    }
}

/// Parameters of one discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub session_uid: SessionUid,
    pub filter: Option<TestFilter>,
    pub cancel: CancellationToken,
}

/// A pluggable test framework.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use testhost_extension::{
///     DiscoveryContext, Extension, ExtensionError, TestCase, TestFailure, TestFramework,
/// };
/// use testhost_types::ExtensionId;
/// use tokio_util::sync::CancellationToken;
///
/// struct Single(ExtensionId);
///
/// #[async_trait]
/// impl Extension for Single {
///     fn uid(&self) -> &ExtensionId { &self.0 }
///     fn display_name(&self) -> &str { "single" }
/// }
///
/// #[async_trait]
/// impl TestFramework for Single {
///     async fn discover(&self, _ctx: &DiscoveryContext) -> Result<Vec<TestCase>, ExtensionError> {
///         Ok(vec![TestCase::new("only", "only")])
///     }
///
///     async fn execute(&self, _case: &TestCase, _cancel: CancellationToken) -> Result<(), TestFailure> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TestFramework: Extension {
    /// Capabilities advertised to the host. Read once at startup.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    /// Prepares framework state for a session.
    async fn create_session(&self, _session_uid: SessionUid) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Releases framework state for a session.
    async fn close_session(&self, _session_uid: SessionUid) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Enumerates the tests of this session.
    async fn discover(&self, ctx: &DiscoveryContext) -> Result<Vec<TestCase>, ExtensionError>;

    /// Runs one test body.
    async fn execute(&self, case: &TestCase, cancel: CancellationToken) -> Result<(), TestFailure>;
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_display() {
        let failure = TestFailure::mismatch("X", "Y");
        assert_eq!(failure.to_string(), "Expected: X, Actual: Y");
    }

    #[test]
    fn assertion_message_display() {
        assert_eq!(TestFailure::assertion("boom").to_string(), "boom");
        assert_eq!(
            TestFailure::exception("io", "disk full").to_string(),
            "io: disk full"
        );
    }

    #[test]
    fn filter_matches_uid_or_name() {
        let case = TestCase::new("math::add", "adds two numbers");
        assert!(TestFilter::new("math").matches(&case));
        assert!(TestFilter::new("two").matches(&case));
        assert!(!TestFilter::new("string").matches(&case));
    }

    #[test]
    fn skip_marker() {
        let case = TestCase::new("a", "a").skipped(Some("flaky".into()));
        assert!(case.is_skipped());
        assert_eq!(
            case.skip.and_then(|s| s.reason).as_deref(),
            Some("flaky")
        );
    }

    #[test]
    fn timeout_serializes_as_millis() {
        let case = TestCase::new("a", "a").with_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&case).expect("serialize");
        assert_eq!(json["timeout"], 1500);

        let back: TestCase = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn oversized_timeout_saturates() {
        let case = TestCase::new("a", "a").with_timeout(Duration::MAX);
        let json = serde_json::to_value(&case).expect("serialize");
        assert_eq!(json["timeout"], u64::MAX);
    }

    #[test]
    fn missing_timeout_deserializes_as_none() {
        let case: TestCase =
            serde_json::from_str(r#"{"uid":"a","display_name":"a"}"#).expect("deserialize");
        assert_eq!(case.timeout, None);
        assert!(!case.is_skipped());
    }
}
