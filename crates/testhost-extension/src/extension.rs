//! The base trait every extension implements.
//!
//! An extension is identified by a stable [`ExtensionId`] and carries
//! display metadata plus an asynchronous enablement predicate. The host
//! evaluates [`Extension::is_enabled`] exactly once per identity at
//! startup; a disabled extension is excluded from every role it was
//! registered under and never called again.
//!
//! # Roles
//!
//! ```text
//! Extension (uid, display_name, is_enabled)
//!   ├── TestFramework               discover + execute
//!   ├── DataProducer                produced_kinds
//!   ├── DataConsumer                consumed_kinds + consume
//!   ├── TestSessionLifetimeHandler  on_session_starting / finishing
//!   ├── ProcessLifetimeHandler      before_start / on_started / on_exited
//!   ├── EnvironmentVariableProvider update / validate
//!   └── CommandLineOptionsProvider  options / validate
//! ```
//!
//! One concrete value may implement several roles. Registered through a
//! composite factory it is constructed once and shared by every role.

use async_trait::async_trait;
use std::sync::Arc;
use testhost_types::ExtensionId;

/// Identity, metadata and enablement shared by every extension role.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use testhost_extension::Extension;
/// use testhost_types::ExtensionId;
///
/// struct Junit {
///     id: ExtensionId,
///     enabled: bool,
/// }
///
/// #[async_trait]
/// impl Extension for Junit {
///     fn uid(&self) -> &ExtensionId { &self.id }
///     fn display_name(&self) -> &str { "JUnit reporter" }
///     async fn is_enabled(&self) -> bool { self.enabled }
/// }
/// ```
#[async_trait]
pub trait Extension: Send + Sync {
    /// Stable identity.
    fn uid(&self) -> &ExtensionId;

    /// Name shown in diagnostics.
    fn display_name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str {
        ""
    }

    /// Extension version string.
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Returns whether the extension takes part in this run.
    ///
    /// Called once per process lifetime, concurrently with the other
    /// extensions' predicates.
    async fn is_enabled(&self) -> bool {
        true
    }
}

/// Returns `true` when both handles point at the same instance.
///
/// Used to tell a shared composite instance (same identity, same value)
/// apart from two distinct values claiming one identity.
#[must_use]
pub fn same_instance<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        id: ExtensionId,
    }

    #[async_trait]
    impl Extension for Plain {
        fn uid(&self) -> &ExtensionId {
            &self.id
        }

        fn display_name(&self) -> &str {
            "plain"
        }
    }

    #[tokio::test]
    async fn defaults() {
        let ext = Plain {
            id: ExtensionId::new("test", "plain"),
        };
        assert!(ext.is_enabled().await);
        assert_eq!(ext.description(), "");
        assert_eq!(ext.version(), "1.0.0");
    }

    #[test]
    fn object_safety() {
        let ext: Arc<dyn Extension> = Arc::new(Plain {
            id: ExtensionId::builtin("plain"),
        });
        assert_eq!(ext.uid().fqn(), "builtin::plain");
    }

    #[test]
    fn same_instance_compares_addresses() {
        let a = Arc::new(Plain {
            id: ExtensionId::builtin("a"),
        });
        let a_again: Arc<dyn Extension> = a.clone();
        let b = Arc::new(Plain {
            id: ExtensionId::builtin("a"),
        });

        assert!(same_instance(&a, &a_again));
        assert!(!same_instance(&a, &b));
    }
}
