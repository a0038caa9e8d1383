//! Message payloads carried by the bus.

use crate::{MessageKind, TestNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use testhost_types::SessionUid;

/// A test node state change within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNodeUpdate {
    /// Session the update belongs to.
    pub session_uid: SessionUid,
    /// Node carrying its new state.
    pub node: TestNode,
}

/// A file produced during a session (e.g. the run report).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifact {
    /// Session the file belongs to.
    pub session_uid: SessionUid,
    /// Location on disk.
    pub path: PathBuf,
    /// Name shown by reporters.
    pub display_name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A file produced outside any session (e.g. a crash dump).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Name shown by reporters.
    pub display_name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Named telemetry event with string properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name (e.g. "run/completed").
    pub name: String,
    /// Event properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl TelemetryEvent {
    /// Creates an event without properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }
}

/// Payload of an extension-defined kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMessage {
    /// Extension namespace.
    pub namespace: String,
    /// Payload kind within the namespace.
    pub kind: String,
    /// Opaque payload.
    pub payload: Value,
}

/// Typed payload flowing through the Message Bus.
///
/// [`kind`](Self::kind) is the runtime type the bus routes on.
///
/// # Example
///
/// ```
/// use testhost_message::{Message, MessageKind, TelemetryEvent};
///
/// let msg = Message::Telemetry(TelemetryEvent::new("run/started"));
/// assert_eq!(msg.kind(), MessageKind::Telemetry);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum Message {
    TestNodeUpdate(TestNodeUpdate),
    SessionArtifact(SessionArtifact),
    FileArtifact(FileArtifact),
    Telemetry(TelemetryEvent),
    Custom(CustomMessage),
}

impl Message {
    /// Returns the runtime kind of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::TestNodeUpdate(_) => MessageKind::TestNodeUpdate,
            Self::SessionArtifact(_) => MessageKind::SessionArtifact,
            Self::FileArtifact(_) => MessageKind::FileArtifact,
            Self::Telemetry(_) => MessageKind::Telemetry,
            Self::Custom(custom) => MessageKind::extension(&custom.namespace, &custom.kind),
        }
    }

    /// Returns the session this message belongs to, if any.
    #[must_use]
    pub fn session_uid(&self) -> Option<SessionUid> {
        match self {
            Self::TestNodeUpdate(update) => Some(update.session_uid),
            Self::SessionArtifact(artifact) => Some(artifact.session_uid),
            _ => None,
        }
    }

    /// Returns the node update, if this is one.
    #[must_use]
    pub fn as_node_update(&self) -> Option<&TestNodeUpdate> {
        match self {
            Self::TestNodeUpdate(update) => Some(update),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestNodeState;
    use testhost_types::TestNodeUid;

    #[test]
    fn kind_follows_variant() {
        let session_uid = SessionUid::new();
        let update = Message::TestNodeUpdate(TestNodeUpdate {
            session_uid,
            node: TestNode::discovered(TestNodeUid::new("a"), "a"),
        });
        assert_eq!(update.kind(), MessageKind::TestNodeUpdate);
        assert_eq!(update.session_uid(), Some(session_uid));

        let custom = Message::Custom(CustomMessage {
            namespace: "coverage".into(),
            kind: "hits".into(),
            payload: serde_json::json!({"lines": 3}),
        });
        assert_eq!(custom.kind(), MessageKind::extension("coverage", "hits"));
        assert_eq!(custom.session_uid(), None);
    }

    #[test]
    fn node_update_survives_json() {
        let msg = Message::TestNodeUpdate(TestNodeUpdate {
            session_uid: SessionUid::new(),
            node: TestNode::discovered(TestNodeUid::new("a"), "a")
                .with_state(TestNodeState::Skipped { reason: Some("slow".into()) }),
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
    }

    #[test]
    fn telemetry_properties() {
        let event = TelemetryEvent::new("run/completed").with("total", 5);
        assert_eq!(event.properties.get("total").map(String::as_str), Some("5"));
    }
}
