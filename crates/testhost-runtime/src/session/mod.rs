//! Test session lifecycle.
//!
//! A [`TestSession`] brackets one or more Discover/Run requests against a
//! single test framework:
//!
//! ```text
//! create ─► framework.create_session ─► handlers.on_session_starting   [Created]
//!    │
//! execute(Discover | Run)                                              [Executing]
//!    │   Discover: publish one Discovered update per test
//!    │   Run:      ExecutionCoordinator::run
//!    │   completion is counted on every exit path
//!    │
//! close ─► handlers.on_session_finishing ─► bus.drain ─► framework.close_session
//!                                                                      [Finishing → Closed]
//! ```
//!
//! `Closed` is only reached after the bus has delivered every message
//! published during the session.

mod error;
mod state;

pub use error::SessionError;
pub use state::{SessionRequest, SessionState};

use crate::bus::MessageBus;
use crate::execution::{CoordinatorOptions, ExecutionCoordinator, RunSummary};
use std::sync::Arc;
use testhost_extension::{
    async_trait, CapabilityKind, DataProducer, DiscoveryContext, Extension, TestCase,
    TestFilter, TestFramework, TestSessionLifetimeHandler,
};
use testhost_message::{Message, MessageKind, TestNode, TestNodeUpdate};
use testhost_types::{ExitCode, ExtensionId, SessionUid};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborators a session works with.
#[derive(Clone)]
pub struct SessionContext {
    pub framework: Arc<dyn TestFramework>,
    pub bus: MessageBus,
    pub handlers: Vec<Arc<dyn TestSessionLifetimeHandler>>,
    pub coordinator: CoordinatorOptions,
    pub filter: Option<TestFilter>,
}

/// Result of one session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Discovery published this many tests.
    Discovered { tests: usize },
    /// Execution finished with this summary.
    Ran(RunSummary),
}

impl SessionOutcome {
    /// Maps the outcome to the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Discovered { tests: 0 } => ExitCode::ZeroTests,
            Self::Discovered { .. } => ExitCode::Success,
            Self::Ran(summary) => summary.exit_code(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Ran(summary) => Some(summary),
            Self::Discovered { .. } => None,
        }
    }
}

/// Identity discovery updates are published under.
#[derive(Debug)]
pub struct SessionProducer {
    id: ExtensionId,
}

impl SessionProducer {
    /// Kinds published by the session.
    pub const KINDS: [MessageKind; 1] = [MessageKind::TestNodeUpdate];

    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExtensionId::builtin("session"),
        }
    }
}

impl Default for SessionProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for SessionProducer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Test session"
    }
}

impl DataProducer for SessionProducer {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        Self::KINDS.to_vec()
    }
}

/// Counts a finished request when dropped.
struct CompletionGuard<'a>(&'a watch::Sender<u64>);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n += 1);
    }
}

/// One discover-or-run lifecycle.
pub struct TestSession {
    uid: SessionUid,
    state: SessionState,
    ctx: SessionContext,
    filter: Option<TestFilter>,
    producer: SessionProducer,
    completions: watch::Sender<u64>,
}

impl TestSession {
    /// Opens a session with the framework and runs the starting hooks.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Cancelled`] if `cancel` already fired
    /// - [`SessionError::Framework`] if the framework refused the session
    /// - [`SessionError::Handler`] if a starting hook failed
    pub async fn create(
        ctx: SessionContext,
        cancel: &CancellationToken,
    ) -> Result<Self, SessionError> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let uid = SessionUid::new();
        let filter = match ctx.filter.clone() {
            Some(filter) if ctx.framework.capabilities().supports(CapabilityKind::Filtering) => {
                Some(filter)
            }
            Some(filter) => {
                warn!(
                    framework = %ctx.framework.uid(),
                    filter = filter.pattern(),
                    "Test framework does not support filtering, filter ignored"
                );
                None
            }
            None => None,
        };

        ctx.framework
            .create_session(uid)
            .await
            .map_err(|e| SessionError::framework("create session", e))?;

        for handler in &ctx.handlers {
            if let Err(e) = handler.on_session_starting(uid, cancel).await {
                error!(session = %uid, handler = %handler.uid(), error = %e, "Session starting hook failed");
                if let Err(close) = ctx.framework.close_session(uid).await {
                    warn!(session = %uid, error = %close, "Failed to close framework session");
                }
                return Err(SessionError::handler(handler.uid(), e));
            }
        }

        info!(session = %uid, framework = %ctx.framework.uid(), "Session created");
        let (completions, _) = watch::channel(0);
        Ok(Self {
            uid,
            state: SessionState::Created,
            ctx,
            filter,
            producer: SessionProducer::new(),
            completions,
        })
    }

    #[must_use]
    pub fn uid(&self) -> SessionUid {
        self.uid
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Filter forwarded to the framework, after capability negotiation.
    #[must_use]
    pub fn filter(&self) -> Option<&TestFilter> {
        self.filter.as_ref()
    }

    /// Number of requests that finished, successfully or not.
    #[must_use]
    pub fn completions(&self) -> watch::Receiver<u64> {
        self.completions.subscribe()
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(session = %self.uid, from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }

    /// Serves one request. The request is counted as complete on every
    /// exit path.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidTransition`] once the session is finishing
    /// - [`SessionError::Framework`] if discovery failed
    pub async fn execute(
        &mut self,
        request: SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        self.transition(SessionState::Executing)?;
        let _done = CompletionGuard(&self.completions);

        info!(session = %self.uid, request = %request, "Serving session request");
        let cases = self.discover(cancel).await?;
        match request {
            SessionRequest::Discover => self.publish_discovered(&cases).await,
            SessionRequest::Run => {
                let coordinator = ExecutionCoordinator::new(
                    Arc::clone(&self.ctx.framework),
                    self.ctx.bus.clone(),
                    self.ctx.coordinator.clone(),
                );
                let summary = coordinator.run(self.uid, cases, cancel).await;
                Ok(SessionOutcome::Ran(summary))
            }
        }
    }

    async fn discover(&self, cancel: &CancellationToken) -> Result<Vec<TestCase>, SessionError> {
        let ctx = DiscoveryContext {
            session_uid: self.uid,
            filter: self.filter.clone(),
            cancel: cancel.clone(),
        };
        let cases = self
            .ctx
            .framework
            .discover(&ctx)
            .await
            .map_err(|e| SessionError::framework("discover", e))?;
        debug!(session = %self.uid, tests = cases.len(), "Discovery finished");
        Ok(cases)
    }

    async fn publish_discovered(&self, cases: &[TestCase]) -> Result<SessionOutcome, SessionError> {
        for case in cases {
            let mut node = TestNode::discovered(case.uid.clone(), case.display_name.clone());
            node.properties = case.properties.clone();
            let message = Message::TestNodeUpdate(TestNodeUpdate {
                session_uid: self.uid,
                node,
            });
            if let Err(e) = self.ctx.bus.publish(&self.producer, message).await {
                error!(session = %self.uid, test = %case.uid, error = %e, "Failed to publish discovered test");
            }
        }
        Ok(SessionOutcome::Discovered { tests: cases.len() })
    }

    /// Runs the finishing hooks, waits for the bus to deliver everything
    /// published so far, and closes the framework session.
    ///
    /// Every step runs even if an earlier one failed; the first failure
    /// is returned.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] if already closed, otherwise the
    /// first hook or framework failure.
    pub async fn close(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.transition(SessionState::Finishing)?;
        let mut first_error = None;

        for handler in &self.ctx.handlers {
            if let Err(e) = handler.on_session_finishing(self.uid, cancel).await {
                error!(session = %self.uid, handler = %handler.uid(), error = %e, "Session finishing hook failed");
                first_error.get_or_insert(SessionError::handler(handler.uid(), e));
            }
        }

        self.ctx.bus.drain().await;

        if let Err(e) = self.ctx.framework.close_session(self.uid).await {
            error!(session = %self.uid, error = %e, "Failed to close framework session");
            first_error.get_or_insert(SessionError::framework("close session", e));
        }

        self.transition(SessionState::Closed)?;
        info!(session = %self.uid, "Session closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSession")
            .field("uid", &self.uid)
            .field("state", &self.state)
            .field("framework", self.ctx.framework.uid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBusBuilder;
    use crate::execution::CoordinatorProducer;
    use testhost_extension::testing::{
        RecordingConsumer, RecordingSessionHandler, Script, ScriptedFramework,
    };
    use testhost_extension::{Capabilities, Capability, DataConsumer, ExtensionError};
    use testhost_message::TestNodeState;

    struct Fixture {
        framework: Arc<ScriptedFramework>,
        consumer: Arc<RecordingConsumer>,
        handler: Arc<RecordingSessionHandler>,
        ctx: SessionContext,
    }

    fn fixture(framework: ScriptedFramework) -> Fixture {
        let framework = Arc::new(framework);
        let consumer = Arc::new(
            RecordingConsumer::new("recorder", [MessageKind::TestNodeUpdate])
                .with_delay(std::time::Duration::from_millis(5)),
        );
        let handler = Arc::new(RecordingSessionHandler::new("hooks"));
        let bus = MessageBusBuilder::new()
            .consumer(Arc::clone(&consumer) as Arc<dyn DataConsumer>)
            .producer(&CoordinatorProducer::new())
            .producer(&SessionProducer::new())
            .build();
        let ctx = SessionContext {
            framework: Arc::clone(&framework) as Arc<dyn TestFramework>,
            bus,
            handlers: vec![Arc::clone(&handler) as Arc<dyn TestSessionLifetimeHandler>],
            coordinator: CoordinatorOptions::default(),
            filter: None,
        };
        Fixture {
            framework,
            consumer,
            handler,
            ctx,
        }
    }

    #[tokio::test]
    async fn discover_publishes_discovered_nodes() {
        let f = fixture(
            ScriptedFramework::new()
                .with_test("a", Script::Pass)
                .with_test("b", Script::Pass),
        );
        let cancel = CancellationToken::new();
        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");

        let outcome = session
            .execute(SessionRequest::Discover, &cancel)
            .await
            .expect("discover");
        session.close(&cancel).await.expect("close");

        assert_eq!(outcome, SessionOutcome::Discovered { tests: 2 });
        assert_eq!(outcome.exit_code(), ExitCode::Success);
        // close drained the bus, so every update is already consumed
        assert_eq!(f.consumer.len(), 2);
        assert!(f
            .consumer
            .messages()
            .iter()
            .filter_map(Message::as_node_update)
            .all(|u| u.node.state == TestNodeState::Discovered));
        assert!(f.framework.executed().is_empty());
    }

    #[tokio::test]
    async fn run_then_close_orders_hooks() {
        let f = fixture(ScriptedFramework::new().with_test("a", Script::Pass));
        let cancel = CancellationToken::new();
        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");
        let uid = session.uid();

        let outcome = session.execute(SessionRequest::Run, &cancel).await.expect("run");
        assert_eq!(session.state(), SessionState::Executing);
        session.close(&cancel).await.expect("close");

        assert_eq!(outcome.exit_code(), ExitCode::Success);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            f.handler.calls(),
            vec![format!("starting:{}", uid), format!("finishing:{}", uid)]
        );
        assert_eq!(
            f.framework.sessions(),
            vec![format!("create:{}", uid), format!("close:{}", uid)]
        );
        assert_eq!(f.consumer.len(), 1);
    }

    #[tokio::test]
    async fn failed_discovery_still_completes_request() {
        let f = fixture(ScriptedFramework::new().failing_discovery(ExtensionError::failed("bad")));
        let cancel = CancellationToken::new();
        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");
        let completions = session.completions();

        let err = session.execute(SessionRequest::Run, &cancel).await.unwrap_err();

        assert!(matches!(err, SessionError::Framework { operation: "discover", .. }));
        assert_eq!(*completions.borrow(), 1);
        session.close(&cancel).await.expect("close");
    }

    #[tokio::test]
    async fn closed_session_rejects_requests() {
        let f = fixture(ScriptedFramework::new());
        let cancel = CancellationToken::new();
        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");
        session.close(&cancel).await.expect("close");

        let err = session.execute(SessionRequest::Run, &cancel).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Closed,
                to: SessionState::Executing
            }
        );
        assert!(session.close(&cancel).await.is_err());
    }

    #[tokio::test]
    async fn filter_requires_capability() {
        let mut f = fixture(
            ScriptedFramework::new()
                .with_test("alpha", Script::Pass)
                .with_test("beta", Script::Pass),
        );
        f.ctx.filter = Some(TestFilter::new("alpha"));
        let cancel = CancellationToken::new();

        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");
        assert!(session.filter().is_none());
        let outcome = session.execute(SessionRequest::Discover, &cancel).await.expect("discover");
        assert_eq!(outcome, SessionOutcome::Discovered { tests: 2 });
        session.close(&cancel).await.expect("close");

        let mut f = fixture(
            ScriptedFramework::new()
                .with_capabilities(Capabilities::new([Capability::Filtering]))
                .with_test("alpha", Script::Pass)
                .with_test("beta", Script::Pass),
        );
        f.ctx.filter = Some(TestFilter::new("alpha"));
        let mut session = TestSession::create(f.ctx.clone(), &cancel).await.expect("create");
        let outcome = session.execute(SessionRequest::Discover, &cancel).await.expect("discover");
        assert_eq!(outcome, SessionOutcome::Discovered { tests: 1 });
        session.close(&cancel).await.expect("close");
    }

    #[tokio::test]
    async fn cancelled_before_create() {
        let f = fixture(ScriptedFramework::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = TestSession::create(f.ctx.clone(), &cancel).await.unwrap_err();
        assert_eq!(err, SessionError::Cancelled);
        assert!(f.framework.sessions().is_empty());
    }
}
