//! Message kinds for subscription-based routing.
//!
//! Producers declare the kinds they publish and consumers declare the
//! kinds they accept. The bus routes a message only to consumers whose
//! declared set contains the message's kind.
//!
//! # Built-in Kinds
//!
//! | Kind | Payload |
//! |------|---------|
//! | `TestNodeUpdate` | [`TestNodeUpdate`](crate::TestNodeUpdate) |
//! | `SessionArtifact` | [`SessionArtifact`](crate::SessionArtifact) |
//! | `FileArtifact` | [`FileArtifact`](crate::FileArtifact) |
//! | `Telemetry` | [`TelemetryEvent`](crate::TelemetryEvent) |
//!
//! # Subscription Flow
//!
//! ```text
//! DataConsumer::consumed_kinds() -> [TestNodeUpdate]
//!     │
//!     ▼
//! MessageBus::register_consumer(consumer)
//!     │
//!     ▼
//! publish(Message::TestNodeUpdate(..))   → delivered
//! publish(Message::SessionArtifact(..))  → not delivered
//! ```
//!
//! # Extension Kinds
//!
//! Extensions exchanging their own payloads use `Extension`:
//!
//! ```
//! use testhost_message::MessageKind;
//!
//! let kind = MessageKind::extension("coverage", "hits");
//! assert!(kind.is_extension());
//! assert_eq!(kind.to_string(), "coverage:hits");
//! ```

use serde::{Deserialize, Serialize};

/// Runtime type of a [`Message`](crate::Message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// State change of a test node (discovered or terminal outcome).
    TestNodeUpdate,

    /// File produced during a session (run report).
    SessionArtifact,

    /// File produced outside any session (crash dump).
    FileArtifact,

    /// Telemetry event.
    Telemetry,

    /// Kind defined by an extension.
    Extension {
        /// Extension namespace (e.g. "coverage").
        namespace: String,
        /// Payload kind within the namespace.
        kind: String,
    },
}

impl MessageKind {
    /// Creates an Extension kind.
    #[must_use]
    pub fn extension(namespace: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Extension {
            namespace: namespace.into(),
            kind: kind.into(),
        }
    }

    /// Returns `true` for artifact kinds (session or file).
    #[must_use]
    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::SessionArtifact | Self::FileArtifact)
    }

    /// Returns `true` if this is an Extension kind.
    #[must_use]
    pub fn is_extension(&self) -> bool {
        matches!(self, Self::Extension { .. })
    }

    /// Returns the display name of this kind.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::TestNodeUpdate => "TestNodeUpdate".to_string(),
            Self::SessionArtifact => "SessionArtifact".to_string(),
            Self::FileArtifact => "FileArtifact".to_string(),
            Self::Telemetry => "Telemetry".to_string(),
            Self::Extension { namespace, kind } => format!("{}:{}", namespace, kind),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_predicates() {
        assert!(MessageKind::SessionArtifact.is_artifact());
        assert!(MessageKind::FileArtifact.is_artifact());
        assert!(!MessageKind::TestNodeUpdate.is_artifact());
        assert!(!MessageKind::Telemetry.is_extension());
    }

    #[test]
    fn kind_extension() {
        let ext = MessageKind::extension("coverage", "hits");

        if let MessageKind::Extension { namespace, kind } = ext {
            assert_eq!(namespace, "coverage");
            assert_eq!(kind, "hits");
        } else {
            panic!("Expected Extension");
        }
    }

    #[test]
    fn kind_display() {
        assert_eq!(MessageKind::TestNodeUpdate.to_string(), "TestNodeUpdate");
        assert_eq!(MessageKind::FileArtifact.to_string(), "FileArtifact");
        assert_eq!(MessageKind::extension("a", "b").to_string(), "a:b");
    }

    #[test]
    fn kind_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(MessageKind::TestNodeUpdate);
        set.insert(MessageKind::Telemetry);
        set.insert(MessageKind::TestNodeUpdate);
        set.insert(MessageKind::extension("a", "b"));
        set.insert(MessageKind::extension("a", "b"));

        assert_eq!(set.len(), 3);
    }

    #[test]
    fn kind_serde() {
        let json = serde_json::to_string(&MessageKind::Telemetry).expect("serialize");
        assert_eq!(json, r#""Telemetry""#);

        let json = r#"{"Extension":{"namespace":"ns","kind":"k"}}"#;
        let kind: MessageKind = serde_json::from_str(json).expect("deserialize");
        assert_eq!(kind, MessageKind::extension("ns", "k"));
    }
}
