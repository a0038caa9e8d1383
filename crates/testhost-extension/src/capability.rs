//! Capability negotiation.
//!
//! A framework advertises optional behaviours as a closed set of
//! [`Capability`] values. The host resolves the set once at startup and
//! queries it through typed lookups; a missing capability is never an
//! error, only a fallback for the component that asked.
//!
//! | Capability | Effect when present |
//! |------------|---------------------|
//! | [`Filtering`](Capability::Filtering) | `--filter` is forwarded to discovery |
//! | [`IncrementalDiscovery`](Capability::IncrementalDiscovery) | Discovered nodes are published as found |
//! | [`TrxReport`](Capability::TrxReport) | Framework supplies TRX-compatible node properties |
//! | [`BannerMessageOwner`](Capability::BannerMessageOwner) | Framework supplies the startup banner |
//! | [`GracefulStop`](Capability::GracefulStop) | Running bodies observe cancellation cooperatively |
//!
//! # Example
//!
//! ```
//! use testhost_extension::{Capabilities, Capability, CapabilityKind};
//!
//! let caps = Capabilities::new([
//!     Capability::Filtering,
//!     Capability::banner("MyFramework v2"),
//! ]);
//!
//! assert!(caps.supports(CapabilityKind::Filtering));
//! assert!(!caps.supports(CapabilityKind::TrxReport));
//! assert_eq!(caps.banner_message(), Some("MyFramework v2"));
//! ```

use serde::{Deserialize, Serialize};

/// An optional behaviour an extension advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum Capability {
    /// Discovery and execution honour a test filter.
    Filtering,
    /// Discovery can publish nodes before enumeration completes.
    IncrementalDiscovery,
    /// Nodes carry properties a TRX reporter needs.
    TrxReport,
    /// The framework owns the startup banner.
    BannerMessageOwner { banner: String },
    /// Test bodies stop early when their token is cancelled.
    GracefulStop,
}

/// Discriminant of [`Capability`], used for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Filtering,
    IncrementalDiscovery,
    TrxReport,
    BannerMessageOwner,
    GracefulStop,
}

impl Capability {
    /// Creates a [`BannerMessageOwner`](Self::BannerMessageOwner) capability.
    #[must_use]
    pub fn banner(text: impl Into<String>) -> Self {
        Self::BannerMessageOwner {
            banner: text.into(),
        }
    }

    /// Returns the lookup discriminant.
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Filtering => CapabilityKind::Filtering,
            Self::IncrementalDiscovery => CapabilityKind::IncrementalDiscovery,
            Self::TrxReport => CapabilityKind::TrxReport,
            Self::BannerMessageOwner { .. } => CapabilityKind::BannerMessageOwner,
            Self::GracefulStop => CapabilityKind::GracefulStop,
        }
    }
}

/// The resolved capability set of one extension.
///
/// At most one capability per [`CapabilityKind`] is kept; a later entry
/// of the same kind replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<Capability>,
}

impl Capabilities {
    /// Creates a set from the given capabilities.
    #[must_use]
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut set = Self::default();
        for capability in capabilities {
            set.insert(capability);
        }
        set
    }

    /// The empty set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a capability, replacing one of the same kind.
    pub fn insert(&mut self, capability: Capability) {
        let kind = capability.kind();
        self.entries.retain(|c| c.kind() != kind);
        self.entries.push(capability);
    }

    /// Returns `true` if a capability of this kind is present.
    #[must_use]
    pub fn supports(&self, kind: CapabilityKind) -> bool {
        self.get(kind).is_some()
    }

    /// Typed lookup.
    #[must_use]
    pub fn get(&self, kind: CapabilityKind) -> Option<&Capability> {
        self.entries.iter().find(|c| c.kind() == kind)
    }

    /// Banner text when the extension owns the banner.
    #[must_use]
    pub fn banner_message(&self) -> Option<&str> {
        match self.get(CapabilityKind::BannerMessageOwner) {
            Some(Capability::BannerMessageOwner { banner }) => Some(banner),
            _ => None,
        }
    }

    /// Iterates over the capabilities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no capability is advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_supports_nothing() {
        let caps = Capabilities::none();
        assert!(caps.is_empty());
        assert!(!caps.supports(CapabilityKind::Filtering));
        assert_eq!(caps.banner_message(), None);
    }

    #[test]
    fn same_kind_replaces() {
        let caps: Capabilities = [Capability::banner("one"), Capability::banner("two")]
            .into_iter()
            .collect();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps.banner_message(), Some("two"));
    }

    #[test]
    fn typed_get() {
        let caps = Capabilities::new([Capability::TrxReport, Capability::GracefulStop]);
        assert_eq!(
            caps.get(CapabilityKind::GracefulStop),
            Some(&Capability::GracefulStop)
        );
        assert!(caps.get(CapabilityKind::IncrementalDiscovery).is_none());
    }

    #[test]
    fn serde_tagging() {
        let json = serde_json::to_string(&Capability::banner("hi")).expect("serialize");
        assert_eq!(json, r#"{"capability":"banner_message_owner","banner":"hi"}"#);
    }
}
