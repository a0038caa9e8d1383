//! IPC errors.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`IpcError::Io`] | `IPC_IO` | Yes |
//! | [`IpcError::ConnectTimeout`] | `IPC_CONNECT_TIMEOUT` | No |
//! | [`IpcError::RequestTimeout`] | `IPC_REQUEST_TIMEOUT` | No |
//! | [`IpcError::Cancelled`] | `IPC_CANCELLED` | No |
//! | [`IpcError::ConnectionClosed`] | `IPC_CONNECTION_CLOSED` | No |
//! | [`IpcError::UnregisteredType`] | `IPC_UNREGISTERED_TYPE` | No |
//! | [`IpcError::UnknownSerializer`] | `IPC_UNKNOWN_SERIALIZER` | No |
//! | [`IpcError::DuplicateSerializer`] | `IPC_DUPLICATE_SERIALIZER` | No |
//! | [`IpcError::UnexpectedMessage`] | `IPC_UNEXPECTED_MESSAGE` | No |
//! | [`IpcError::FrameTooLarge`] | `IPC_FRAME_TOO_LARGE` | No |
//! | [`IpcError::Serialization`] | `IPC_SERIALIZATION` | No |
//! | [`IpcError::IncompatibleProtocol`] | `IPC_INCOMPATIBLE_PROTOCOL` | No |
//! | [`IpcError::Handler`] | `IPC_HANDLER_FAILED` | No |
//! | [`IpcError::UnsupportedPlatform`] | `IPC_UNSUPPORTED_PLATFORM` | No |
//!
//! Every variant except `Io` is an infrastructure failure that aborts the
//! run.

use testhost_types::ErrorCode;
use thiserror::Error;

/// IPC error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    /// Transport I/O failed.
    #[error("ipc i/o error: {0}")]
    Io(String),

    /// No controller accepted the connection in time.
    #[error("timed out connecting to pipe {pipe} after {after_ms}ms")]
    ConnectTimeout { pipe: String, after_ms: u64 },

    /// The peer did not reply in time.
    #[error("timed out waiting for reply to {message} after {after_ms}ms")]
    RequestTimeout { message: &'static str, after_ms: u64 },

    /// The run was cancelled while waiting.
    #[error("ipc operation cancelled")]
    Cancelled,

    /// The peer closed the connection mid-exchange.
    #[error("ipc connection closed by peer")]
    ConnectionClosed,

    /// The message type has no registered serializer.
    #[error("no serializer registered for {0}")]
    UnregisteredType(&'static str),

    /// A frame carried a serializer id nobody registered.
    #[error("unknown serializer id {0}")]
    UnknownSerializer(u16),

    /// Two message types claimed the same serializer id.
    #[error("serializer id {id} already registered for {existing}")]
    DuplicateSerializer { id: u16, existing: &'static str },

    /// A reply of the wrong type arrived.
    #[error("expected {expected}, received serializer id {actual}")]
    UnexpectedMessage { expected: &'static str, actual: u16 },

    /// A frame exceeded the size limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// A body could not be encoded or decoded.
    #[error("ipc serialization error: {0}")]
    Serialization(String),

    /// The peers speak different protocol versions.
    #[error("incompatible protocol: local {local}, remote {remote}")]
    IncompatibleProtocol { local: String, remote: String },

    /// The server-side handler failed.
    #[error("request handler failed: {0}")]
    Handler(String),

    /// Named-pipe transport is not available on this platform.
    #[error("ipc transport is not supported on this platform")]
    UnsupportedPlatform,
}

impl IpcError {
    pub(crate) fn millis(duration: std::time::Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => Self::ConnectionClosed,
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl ErrorCode for IpcError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IPC_IO",
            Self::ConnectTimeout { .. } => "IPC_CONNECT_TIMEOUT",
            Self::RequestTimeout { .. } => "IPC_REQUEST_TIMEOUT",
            Self::Cancelled => "IPC_CANCELLED",
            Self::ConnectionClosed => "IPC_CONNECTION_CLOSED",
            Self::UnregisteredType(_) => "IPC_UNREGISTERED_TYPE",
            Self::UnknownSerializer(_) => "IPC_UNKNOWN_SERIALIZER",
            Self::DuplicateSerializer { .. } => "IPC_DUPLICATE_SERIALIZER",
            Self::UnexpectedMessage { .. } => "IPC_UNEXPECTED_MESSAGE",
            Self::FrameTooLarge { .. } => "IPC_FRAME_TOO_LARGE",
            Self::Serialization(_) => "IPC_SERIALIZATION",
            Self::IncompatibleProtocol { .. } => "IPC_INCOMPATIBLE_PROTOCOL",
            Self::Handler(_) => "IPC_HANDLER_FAILED",
            Self::UnsupportedPlatform => "IPC_UNSUPPORTED_PLATFORM",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
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
                IpcError::Io("x".into()),
                IpcError::ConnectTimeout {
                    pipe: "p".into(),
                    after_ms: 1,
                },
                IpcError::RequestTimeout {
                    message: "ModuleInfoRequest",
                    after_ms: 1,
                },
                IpcError::Cancelled,
                IpcError::ConnectionClosed,
                IpcError::UnregisteredType("T"),
                IpcError::UnknownSerializer(99),
                IpcError::DuplicateSerializer {
                    id: 1,
                    existing: "T",
                },
                IpcError::UnexpectedMessage {
                    expected: "T",
                    actual: 2,
                },
                IpcError::FrameTooLarge { len: 2, max: 1 },
                IpcError::Serialization("x".into()),
                IpcError::IncompatibleProtocol {
                    local: "1".into(),
                    remote: "2".into(),
                },
                IpcError::Handler("x".into()),
                IpcError::UnsupportedPlatform,
            ],
            "IPC_",
        );
    }

    #[test]
    fn eof_maps_to_closed() {
        let err: IpcError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err, IpcError::ConnectionClosed);

        let err: IpcError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(err.is_recoverable());
    }
}
