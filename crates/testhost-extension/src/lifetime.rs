//! Session and process lifetime hooks.
//!
//! # Session hooks
//!
//! ```text
//! CreateSession ─► on_session_starting ─► Discover | Run ─► on_session_finishing ─► Close
//! ```
//!
//! # Process hooks
//!
//! Observed by the controller that launches a test host, independently of
//! the IPC channel:
//!
//! ```text
//! before_start(env) ─► spawn ─► on_started(pid) ─► wait ─► on_exited(record)
//! ```

use crate::{Extension, ExtensionError, MessagePublisher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use testhost_types::SessionUid;
use tokio_util::sync::CancellationToken;

/// Hooks invoked around every test session.
#[async_trait]
pub trait TestSessionLifetimeHandler: Extension {
    async fn on_session_starting(
        &self,
        _session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    async fn on_session_finishing(
        &self,
        _session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }
}

/// Lifetime of one launched test host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLifetimeRecord {
    /// OS process id.
    pub pid: u32,
    /// When the process was spawned.
    pub started_at: SystemTime,
    /// Raw exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// `true` when the host announced its exit before terminating.
    pub graceful: bool,
}

impl ProcessLifetimeRecord {
    /// Returns `true` when the host exited without announcing it.
    #[must_use]
    pub fn is_ungraceful(&self) -> bool {
        !self.graceful
    }
}

/// Hooks invoked around a launched test host process.
#[async_trait]
pub trait ProcessLifetimeHandler: Extension {
    /// Called before the process is spawned.
    async fn before_start(&self) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called once the process is running.
    async fn on_started(&self, _pid: u32) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called after the process terminated.
    async fn on_exited(
        &self,
        _record: &ProcessLifetimeRecord,
        _publisher: &dyn MessagePublisher,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }
}
