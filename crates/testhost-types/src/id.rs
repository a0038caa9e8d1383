//! Identifier types.
//!
//! Extension identities are stable across processes (UUID v5 derived
//! from the fully qualified name) so a controller and its child host agree
//! on who produced a message. Session and request identities are random.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// Namespace UUID for deterministic UUID v5 generation.
const TESTHOST_NAMESPACE: Uuid = uuid!("5b0f6c1e-8d43-4f0a-9a35-2f7c1de9b6a4");

/// Stable identity of a registered extension.
///
/// The UUID is derived from `namespace::name`, so registering the same
/// extension twice yields equal identifiers. The registry relies on this
/// to detect duplicate identities and to evaluate enablement once per
/// extension even when one instance serves several roles.
///
/// # Example
///
/// ```
/// use testhost_types::ExtensionId;
///
/// let a = ExtensionId::new("reporter", "trx");
/// let b = ExtensionId::new("reporter", "trx");
/// assert_eq!(a, b);
/// assert_eq!(a.fqn(), "reporter::trx");
///
/// let coordinator = ExtensionId::builtin("coordinator");
/// assert!(coordinator.is_builtin());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionId {
    /// Deterministic UUID v5 of the fully qualified name.
    pub uuid: Uuid,
    /// Namespace (`builtin`, `framework`, `reporter`, ...).
    pub namespace: String,
    /// Extension name within the namespace.
    pub name: String,
}

impl ExtensionId {
    /// Creates an identifier in the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        let uuid = Uuid::new_v5(
            &TESTHOST_NAMESPACE,
            format!("{}::{}", namespace, name).as_bytes(),
        );
        Self {
            uuid,
            namespace,
            name,
        }
    }

    /// Creates an identifier in the `builtin` namespace.
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new("builtin", name)
    }

    /// Returns `namespace::name`.
    #[must_use]
    pub fn fqn(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }

    /// Returns `true` for platform-provided extensions.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.namespace == "builtin"
    }
}

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.namespace, self.name)
    }
}

/// Identity of one test session (one Discover or Run request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionUid(pub Uuid);

impl SessionUid {
    /// Creates a new random session identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionUid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Identity of a test node, as assigned by the test framework.
///
/// The platform treats it as an opaque string: frameworks decide whether it
/// is a fully qualified method name, a file path with a line number, or a
/// hash of a data row.
///
/// # Example
///
/// ```
/// use testhost_types::TestNodeUid;
///
/// let uid = TestNodeUid::new("math::adds_numbers");
/// assert_eq!(uid.as_str(), "math::adds_numbers");
/// assert_eq!(uid.to_string(), "math::adds_numbers");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestNodeUid(String);

impl TestNodeUid {
    /// Wraps a framework-provided identifier.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TestNodeUid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TestNodeUid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TestNodeUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a session request (Discover or Run).
///
/// Used to correlate the "request complete" signal with the request that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

#[allow(clippy::new_without_default)] // generated by the session layer, never defaulted
impl RequestId {
    /// Creates a new random request identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req:{}", self.0)
    }
}
