//! Application-level error types.
//!
//! [`BuildError`] covers composition failures detected by
//! [`TestApplicationBuilder::build`](crate::TestApplicationBuilder::build);
//! [`AppError`] unifies everything that can end a run. Both map to the
//! closed [`ExitCode`] enumeration:
//!
//! | Error | Exit code |
//! |-------|-----------|
//! | option or config file problems | `InvalidCommandLine` |
//! | framework registration, duplicate identity, environment override | `InvalidPlatformSetup` |
//! | framework refused the session | `TestAdapterTestSessionFailure` |
//! | cancellation | `TestSessionAborted` |
//! | protocol mismatch with the controller | `IncompatibleProtocolVersion` |
//! | anything else | `GenericFailure` |

use testhost_extension::ExtensionError;
use testhost_runtime::process::ProcessError;
use testhost_runtime::{BusError, ConfigError, IpcError, RegistryError, SessionError};
use testhost_types::{ErrorCode, ExitCode, ExtensionId};
use thiserror::Error;

/// Composition failure.
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`AlreadyBuilt`](Self::AlreadyBuilt) | `BUILD_ALREADY_BUILT` | No |
/// | [`MissingFramework`](Self::MissingFramework) | `BUILD_MISSING_FRAMEWORK` | No |
/// | [`DuplicateFramework`](Self::DuplicateFramework) | `BUILD_DUPLICATE_FRAMEWORK` | No |
/// | [`NoEnabledFramework`](Self::NoEnabledFramework) | `BUILD_NO_ENABLED_FRAMEWORK` | No |
/// | [`Registry`](Self::Registry) | `BUILD_REGISTRY` | No |
/// | [`Config`](Self::Config) | `BUILD_CONFIG` | No |
/// | [`UnknownOption`](Self::UnknownOption) | `BUILD_UNKNOWN_OPTION` | No |
/// | [`DuplicateOption`](Self::DuplicateOption) | `BUILD_DUPLICATE_OPTION` | No |
/// | [`InvalidOption`](Self::InvalidOption) | `BUILD_INVALID_OPTION` | No |
/// | [`InvalidConfiguration`](Self::InvalidConfiguration) | `BUILD_INVALID_CONFIGURATION` | No |
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build() was already called on this builder")]
    AlreadyBuilt,

    #[error("no test framework registered")]
    MissingFramework,

    #[error("{0} test frameworks registered, exactly one is required")]
    DuplicateFramework(usize),

    #[error("the registered test framework is disabled")]
    NoEnabledFramework,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown option '--{0}'")]
    UnknownOption(String),

    #[error("option '--{option}' is declared by both {first} and {second}")]
    DuplicateOption {
        option: String,
        first: ExtensionId,
        second: ExtensionId,
    },

    #[error("invalid option '--{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    /// A provider rejected the combination of options.
    #[error("{provider} rejected the options: {reason}")]
    InvalidConfiguration {
        provider: ExtensionId,
        reason: String,
    },
}

impl BuildError {
    pub(crate) fn invalid_option(option: impl Into<String>, source: &ExtensionError) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: source.to_string(),
        }
    }

    /// Maps the failure to the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::AlreadyBuilt => ExitCode::GenericFailure,
            Self::MissingFramework
            | Self::DuplicateFramework(_)
            | Self::NoEnabledFramework
            | Self::Registry(_) => ExitCode::InvalidPlatformSetup,
            Self::Config(_)
            | Self::UnknownOption(_)
            | Self::DuplicateOption { .. }
            | Self::InvalidOption { .. }
            | Self::InvalidConfiguration { .. } => ExitCode::InvalidCommandLine,
        }
    }
}

impl ErrorCode for BuildError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyBuilt => "BUILD_ALREADY_BUILT",
            Self::MissingFramework => "BUILD_MISSING_FRAMEWORK",
            Self::DuplicateFramework(_) => "BUILD_DUPLICATE_FRAMEWORK",
            Self::NoEnabledFramework => "BUILD_NO_ENABLED_FRAMEWORK",
            Self::Registry(_) => "BUILD_REGISTRY",
            Self::Config(_) => "BUILD_CONFIG",
            Self::UnknownOption(_) => "BUILD_UNKNOWN_OPTION",
            Self::DuplicateOption { .. } => "BUILD_DUPLICATE_OPTION",
            Self::InvalidOption { .. } => "BUILD_INVALID_OPTION",
            Self::InvalidConfiguration { .. } => "BUILD_INVALID_CONFIGURATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Unified application error.
///
/// Collects all internal errors into a single type for the binary.
///
/// # Example
///
/// ```
/// use testhost_app::{AppError, BuildError};
/// use testhost_types::ExitCode;
///
/// let err: AppError = BuildError::MissingFramework.into();
/// assert_eq!(err.exit_code(), ExitCode::InvalidPlatformSetup);
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Maps the failure to the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Build(e) => e.exit_code(),
            Self::Session(SessionError::Cancelled) | Self::Ipc(IpcError::Cancelled) => {
                ExitCode::TestSessionAborted
            }
            Self::Session(SessionError::Framework { .. }) => ExitCode::TestAdapterTestSessionFailure,
            Self::Ipc(IpcError::IncompatibleProtocol { .. }) => {
                ExitCode::IncompatibleProtocolVersion
            }
            Self::Process(ProcessError::EnvironmentValidation { .. }) => {
                ExitCode::InvalidPlatformSetup
            }
            Self::Config(_) => ExitCode::InvalidCommandLine,
            _ => ExitCode::GenericFailure,
        }
    }
}

impl ErrorCode for AppError {
    fn code(&self) -> &'static str {
        match self {
            Self::Build(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Ipc(e) => e.code(),
            Self::Process(e) => e.code(),
            Self::Bus(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Io(_) => "APP_IO_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Build(e) => e.is_recoverable(),
            Self::Session(e) => e.is_recoverable(),
            Self::Ipc(e) => e.is_recoverable(),
            Self::Process(e) => e.is_recoverable(),
            Self::Bus(e) => e.is_recoverable(),
            Self::Config(e) => e.is_recoverable(),
            Self::Io(_) => true,
        }
    }
}
