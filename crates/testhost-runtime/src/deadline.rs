//! Deadlines linked to a parent cancellation token.
//!
//! A [`Deadline`] owns a child token of the run-wide token. The child is
//! cancelled when either the parent fires or the timeout elapses, so code
//! running under it observes one token, while [`Deadline::run`] still
//! reports which of the two happened.
//!
//! ```text
//! parent token ──► child token ──► body
//!                     ▲
//! timeout ────────────┘
//! ```

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a deadline-guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineError {
    /// The parent token was cancelled.
    Cancelled,
    /// The timeout elapsed first.
    Timeout(Duration),
}

/// Timeout plus cancellation for a single unit of work.
#[derive(Debug)]
pub struct Deadline {
    parent: CancellationToken,
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl Deadline {
    /// Creates a deadline under `parent`. `None` never times out.
    #[must_use]
    pub fn new(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            parent: parent.clone(),
            token: parent.child_token(),
            timeout,
        }
    }

    /// Token to hand to the guarded work.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drives `fut` until it completes, the parent is cancelled, or the
    /// timeout elapses. A future that is already complete wins.
    ///
    /// # Errors
    ///
    /// [`DeadlineError::Cancelled`] or [`DeadlineError::Timeout`]. In both
    /// cases the child token is cancelled and `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineError> {
        let expiry = async {
            match self.timeout {
                Some(after) => {
                    tokio::time::sleep(after).await;
                    after
                }
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            biased;
            out = fut => Ok(out),
            _ = self.parent.cancelled() => Err(DeadlineError::Cancelled),
            after = expiry => Err(DeadlineError::Timeout(after)),
        };
        if result.is_err() {
            self.token.cancel();
        }
        result
    }
}
