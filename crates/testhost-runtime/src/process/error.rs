//! Process orchestration errors.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ProcessError::Environment`] | `PROCESS_ENVIRONMENT_FAILED` | No |
//! | [`ProcessError::EnvironmentValidation`] | `PROCESS_ENVIRONMENT_INVALID` | No |
//! | [`ProcessError::Handler`] | `PROCESS_HANDLER_FAILED` | No |
//! | [`ProcessError::Spawn`] | `PROCESS_SPAWN_FAILED` | No |
//! | [`ProcessError::Wait`] | `PROCESS_WAIT_FAILED` | No |

use testhost_extension::ExtensionError;
use testhost_types::{ErrorCode, ExtensionId};
use thiserror::Error;

/// Process orchestration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// An environment provider failed to update the environment.
    #[error("environment provider {provider} failed: {source}")]
    Environment {
        provider: ExtensionId,
        #[source]
        source: ExtensionError,
    },

    /// An environment provider rejected the final environment.
    #[error("environment rejected by {provider}: {source}")]
    EnvironmentValidation {
        provider: ExtensionId,
        #[source]
        source: ExtensionError,
    },

    /// A process lifetime handler failed before or at start.
    #[error("process lifetime handler {handler} failed: {source}")]
    Handler {
        handler: ExtensionId,
        #[source]
        source: ExtensionError,
    },

    /// The process could not be started.
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// Waiting for the process failed.
    #[error("failed to wait for test host: {0}")]
    Wait(String),
}

impl ErrorCode for ProcessError {
    fn code(&self) -> &'static str {
        match self {
            Self::Environment { .. } => "PROCESS_ENVIRONMENT_FAILED",
            Self::EnvironmentValidation { .. } => "PROCESS_ENVIRONMENT_INVALID",
            Self::Handler { .. } => "PROCESS_HANDLER_FAILED",
            Self::Spawn { .. } => "PROCESS_SPAWN_FAILED",
            Self::Wait(_) => "PROCESS_WAIT_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
