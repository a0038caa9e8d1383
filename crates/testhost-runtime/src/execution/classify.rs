//! Outcome classification.
//!
//! A single pure function maps how a test body ended to its terminal
//! [`TestNodeState`].
//!
//! | Outcome | State |
//! |---------|-------|
//! | returned normally | `Passed` |
//! | assertion with expected/actual | `Failed` (`Expected: X, Actual: Y`) |
//! | assertion with message | `Failed` |
//! | exception | `Error` |
//! | infrastructure failure | `Error` (`infrastructure`) |
//! | panic | `Error` (`panic`) |
//! | cancelled | `Cancelled` |
//! | deadline elapsed | `Timeout` |

use std::any::Any;
use std::time::Duration;
use testhost_extension::TestFailure;
use testhost_message::{ExceptionInfo, TestNodeState};

/// How a test body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The body returned.
    Completed(Result<(), TestFailure>),
    /// The body panicked with the given message.
    Panicked(String),
    /// The per-test deadline elapsed.
    TimedOut(Duration),
    /// The run was cancelled before or during the body.
    Cancelled,
}

/// Maps an outcome to its terminal state.
#[must_use]
pub fn classify(outcome: ExecutionOutcome) -> TestNodeState {
    match outcome {
        ExecutionOutcome::Completed(Ok(())) => TestNodeState::Passed,
        ExecutionOutcome::Completed(Err(failure)) => classify_failure(failure),
        ExecutionOutcome::Panicked(message) => TestNodeState::Error {
            exception: ExceptionInfo::new("panic", message),
        },
        ExecutionOutcome::TimedOut(after) => TestNodeState::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        },
        ExecutionOutcome::Cancelled => TestNodeState::Cancelled,
    }
}

fn classify_failure(failure: TestFailure) -> TestNodeState {
    match failure {
        TestFailure::Assertion {
            message,
            expected: Some(expected),
            actual: Some(actual),
        } => {
            let info = ExceptionInfo::assertion(expected, actual);
            let explanation = match message {
                Some(message) => format!("{}. {}", message, info.message),
                None => info.message.clone(),
            };
            TestNodeState::Failed {
                exception: Some(info),
                explanation,
            }
        }
        TestFailure::Assertion { message, .. } => {
            let explanation = message.unwrap_or_else(|| "assertion failed".to_string());
            TestNodeState::Failed {
                exception: Some(ExceptionInfo::new("assertion", explanation.clone())),
                explanation,
            }
        }
        TestFailure::Exception { type_name, message } => TestNodeState::Error {
            exception: ExceptionInfo::new(type_name, message),
        },
        TestFailure::Infrastructure(message) => TestNodeState::Error {
            exception: ExceptionInfo::new("infrastructure", message),
        },
        TestFailure::Cancelled => TestNodeState::Cancelled,
    }
}

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test body panicked".to_string()
    }
}
