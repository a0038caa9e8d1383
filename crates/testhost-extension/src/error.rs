//! Extension layer errors.
//!
//! Errors raised by extensions through the SDK traits.
//! All errors implement [`ErrorCode`] for unified handling.
//!
//! # Error Code Convention
//!
//! All extension errors use the `EXTENSION_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`NotSupported`](ExtensionError::NotSupported) | `EXTENSION_NOT_SUPPORTED` | No |
//! | [`Failed`](ExtensionError::Failed) | `EXTENSION_FAILED` | Yes |
//! | [`InvalidOption`](ExtensionError::InvalidOption) | `EXTENSION_INVALID_OPTION` | No |
//! | [`Validation`](ExtensionError::Validation) | `EXTENSION_VALIDATION_FAILED` | No |
//! | [`EnvironmentLocked`](ExtensionError::EnvironmentLocked) | `EXTENSION_ENVIRONMENT_LOCKED` | No |
//! | [`Publish`](ExtensionError::Publish) | `EXTENSION_PUBLISH_FAILED` | Yes |
//! | [`Cancelled`](ExtensionError::Cancelled) | `EXTENSION_CANCELLED` | No |
//!
//! # Example
//!
//! ```
//! use testhost_extension::ExtensionError;
//! use testhost_types::ErrorCode;
//!
//! let err = ExtensionError::InvalidOption {
//!     option: "report-severity".into(),
//!     reason: "expected error or warning".into(),
//! };
//! assert_eq!(err.code(), "EXTENSION_INVALID_OPTION");
//! assert!(!err.is_recoverable());
//! ```

use testhost_types::ErrorCode;
use thiserror::Error;

/// Extension layer error.
///
/// # Variants
///
/// | Variant | When | Recovery |
/// |---------|------|----------|
/// | `NotSupported` | Hook not implemented by this extension | Fix caller |
/// | `Failed` | Hook ran and failed | May retry |
/// | `InvalidOption` | Command-line option rejected | Fix arguments |
/// | `Validation` | Configuration or environment rejected | Fix setup |
/// | `EnvironmentLocked` | Locked variable overwritten | Fix provider order |
/// | `Publish` | Message could not be published | May retry |
/// | `Cancelled` | Cancellation observed | Intentional |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    /// The requested hook is not supported by this extension.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// The hook ran and failed.
    ///
    /// **Recoverable** - a later call may succeed.
    #[error("extension failed: {0}")]
    Failed(String),

    /// A command-line option value was rejected.
    #[error("invalid option --{option}: {reason}")]
    InvalidOption { option: String, reason: String },

    /// Configuration or environment did not pass validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A provider tried to overwrite a locked environment variable.
    #[error("environment variable {name} is locked")]
    EnvironmentLocked { name: String },

    /// A message could not be handed to the bus.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Cancellation was observed while the hook ran.
    #[error("extension cancelled")]
    Cancelled,
}

impl ExtensionError {
    /// Creates a [`Failed`](Self::Failed) error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an [`InvalidOption`](Self::InvalidOption) error.
    #[must_use]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ExtensionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotSupported(_) => "EXTENSION_NOT_SUPPORTED",
            Self::Failed(_) => "EXTENSION_FAILED",
            Self::InvalidOption { .. } => "EXTENSION_INVALID_OPTION",
            Self::Validation(_) => "EXTENSION_VALIDATION_FAILED",
            Self::EnvironmentLocked { .. } => "EXTENSION_ENVIRONMENT_LOCKED",
            Self::Publish(_) => "EXTENSION_PUBLISH_FAILED",
            Self::Cancelled => "EXTENSION_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Publish(_))
    }
}
