//! Session states and requests.

use super::SessionError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of a test session.
///
/// ```text
/// Created ──► Executing ──► Finishing ──► Closed
///    │                          ▲
///    └──────────────────────────┘  (closed without a request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Executing,
    Finishing,
    Closed,
}

impl SessionState {
    /// Returns `true` if `next` may follow `self`.
    ///
    /// A session serves several requests, so `Executing` may repeat.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Executing)
                | (Self::Executing, Self::Executing)
                | (Self::Created, Self::Finishing)
                | (Self::Executing, Self::Finishing)
                | (Self::Finishing, Self::Closed)
        )
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Executing => "executing",
            Self::Finishing => "finishing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a session was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRequest {
    /// Enumerate tests and publish them as discovered.
    Discover,
    /// Enumerate and execute tests.
    Run,
}

impl SessionRequest {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Run => "run",
        }
    }
}

impl FromStr for SessionRequest {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discover" => Ok(Self::Discover),
            "run" => Ok(Self::Run),
            other => Err(SessionError::UnsupportedRequest(other.to_string())),
        }
    }
}

impl std::fmt::Display for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
