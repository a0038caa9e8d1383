//! Process exit codes.
//!
//! The set is closed: a controller that observes a code outside this
//! enumeration treats it as an unknown infrastructure failure (see
//! [`ExitCode::classify`]).
//!
//! | Code | Variant |
//! |------|---------|
//! | 0 | [`Success`](ExitCode::Success) |
//! | 1 | [`GenericFailure`](ExitCode::GenericFailure) |
//! | 2 | [`AtLeastOneTestFailed`](ExitCode::AtLeastOneTestFailed) |
//! | 3 | [`TestSessionAborted`](ExitCode::TestSessionAborted) |
//! | 4 | [`InvalidPlatformSetup`](ExitCode::InvalidPlatformSetup) |
//! | 5 | [`InvalidCommandLine`](ExitCode::InvalidCommandLine) |
//! | 7 | [`TestHostProcessExitedNonGracefully`](ExitCode::TestHostProcessExitedNonGracefully) |
//! | 8 | [`ZeroTests`](ExitCode::ZeroTests) |
//! | 10 | [`TestAdapterTestSessionFailure`](ExitCode::TestAdapterTestSessionFailure) |
//! | 12 | [`IncompatibleProtocolVersion`](ExitCode::IncompatibleProtocolVersion) |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed enumeration of process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ExitCode {
    /// Every test passed or was skipped.
    Success,
    /// Infrastructure failure (IPC, unexpected error, unknown child code).
    GenericFailure,
    /// At least one test ended Failed, Error or Timeout.
    AtLeastOneTestFailed,
    /// The run was cancelled before completion.
    TestSessionAborted,
    /// Missing or duplicate registrations, invalid environment.
    InvalidPlatformSetup,
    /// Invalid command-line option values.
    InvalidCommandLine,
    /// The child test host exited without notifying the controller.
    TestHostProcessExitedNonGracefully,
    /// The run completed but no test was executed.
    ZeroTests,
    /// The test framework failed to create or close its session.
    TestAdapterTestSessionFailure,
    /// Controller and host disagree on the IPC protocol version.
    IncompatibleProtocolVersion,
}

/// A raw exit code that is not part of [`ExitCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown exit code: {0}")]
pub struct UnknownExitCode(pub i32);

impl ExitCode {
    /// Every member of the enumeration, in numeric order.
    pub const ALL: [ExitCode; 10] = [
        Self::Success,
        Self::GenericFailure,
        Self::AtLeastOneTestFailed,
        Self::TestSessionAborted,
        Self::InvalidPlatformSetup,
        Self::InvalidCommandLine,
        Self::TestHostProcessExitedNonGracefully,
        Self::ZeroTests,
        Self::TestAdapterTestSessionFailure,
        Self::IncompatibleProtocolVersion,
    ];

    /// Returns the numeric process exit code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GenericFailure => 1,
            Self::AtLeastOneTestFailed => 2,
            Self::TestSessionAborted => 3,
            Self::InvalidPlatformSetup => 4,
            Self::InvalidCommandLine => 5,
            Self::TestHostProcessExitedNonGracefully => 7,
            Self::ZeroTests => 8,
            Self::TestAdapterTestSessionFailure => 10,
            Self::IncompatibleProtocolVersion => 12,
        }
    }

    /// Maps a raw code observed from a child process.
    ///
    /// Codes outside the enumeration collapse to
    /// [`GenericFailure`](Self::GenericFailure).
    #[must_use]
    pub fn classify(raw: i32) -> Self {
        Self::try_from(raw).unwrap_or(Self::GenericFailure)
    }

    /// Returns `true` for [`Success`](Self::Success).
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<ExitCode> for i32 {
    fn from(value: ExitCode) -> Self {
        value.code()
    }
}

impl TryFrom<i32> for ExitCode {
    type Error = UnknownExitCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.code() == value)
            .ok_or(UnknownExitCode(value))
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
