//! Session errors.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`SessionError::InvalidTransition`] | `SESSION_INVALID_TRANSITION` | No |
//! | [`SessionError::UnsupportedRequest`] | `SESSION_UNSUPPORTED_REQUEST` | No |
//! | [`SessionError::Framework`] | `SESSION_FRAMEWORK_FAILED` | No |
//! | [`SessionError::Handler`] | `SESSION_HANDLER_FAILED` | No |
//! | [`SessionError::Cancelled`] | `SESSION_CANCELLED` | Yes |

use super::SessionState;
use testhost_extension::ExtensionError;
use testhost_types::{ErrorCode, ExtensionId};
use thiserror::Error;

/// Session lifecycle error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The requested transition is not allowed from the current state.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The request kind is not one the session understands.
    #[error("unsupported session request: {0}")]
    UnsupportedRequest(String),

    /// The test framework failed a session operation.
    #[error("test framework failed to {operation}: {source}")]
    Framework {
        operation: &'static str,
        #[source]
        source: ExtensionError,
    },

    /// A session lifetime handler failed.
    #[error("session handler {handler} failed: {source}")]
    Handler {
        handler: ExtensionId,
        #[source]
        source: ExtensionError,
    },

    /// The run was cancelled before the session started.
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Creates a Framework error.
    pub fn framework(operation: &'static str, source: ExtensionError) -> Self {
        Self::Framework { operation, source }
    }

    /// Creates a Handler error.
    pub fn handler(handler: &ExtensionId, source: ExtensionError) -> Self {
        Self::Handler {
            handler: handler.clone(),
            source,
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "SESSION_INVALID_TRANSITION",
            Self::UnsupportedRequest(_) => "SESSION_UNSUPPORTED_REQUEST",
            Self::Framework { .. } => "SESSION_FRAMEWORK_FAILED",
            Self::Handler { .. } => "SESSION_HANDLER_FAILED",
            Self::Cancelled => "SESSION_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                SessionError::InvalidTransition {
                    from: SessionState::Closed,
                    to: SessionState::Executing,
                },
                SessionError::UnsupportedRequest("x".into()),
                SessionError::framework("discover", ExtensionError::failed("x")),
                SessionError::handler(&ExtensionId::builtin("h"), ExtensionError::Cancelled),
                SessionError::Cancelled,
            ],
            "SESSION_",
        );
    }

    #[test]
    fn messages() {
        let err = SessionError::InvalidTransition {
            from: SessionState::Closed,
            to: SessionState::Executing,
        };
        assert_eq!(
            err.to_string(),
            "invalid session transition from closed to executing"
        );
        assert!(SessionError::Cancelled.is_recoverable());
    }
}
