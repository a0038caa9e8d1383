//! Message Bus errors.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`BusError::UndeclaredMessageKind`] | `BUS_UNDECLARED_MESSAGE_KIND` | No |
//! | [`BusError::Closed`] | `BUS_CLOSED` | No |
//!
//! Consumer failures are not bus errors: they are isolated and logged.

use testhost_message::MessageKind;
use testhost_types::{ErrorCode, ExtensionId};
use thiserror::Error;

/// Message Bus error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The producer published a kind it did not declare.
    #[error("producer {producer} did not declare message kind {kind}")]
    UndeclaredMessageKind {
        producer: ExtensionId,
        kind: MessageKind,
    },

    /// The bus was shut down.
    #[error("message bus is closed")]
    Closed,
}

impl ErrorCode for BusError {
    fn code(&self) -> &'static str {
        match self {
            Self::UndeclaredMessageKind { .. } => "BUS_UNDECLARED_MESSAGE_KIND",
            Self::Closed => "BUS_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
