//! Recording fakes for testing hosts and extensions.
//!
//! Lets the runtime and application crates exercise the full pipeline
//! without a real test framework or reporter.
//!
//! # Features
//!
//! - [`ScriptedFramework`]: each test follows a [`Script`] (pass, mismatch,
//!   throw, panic, sleep, hang) and the framework records the peak number
//!   of concurrently running bodies
//! - [`RecordingConsumer`]: records every delivered message, can be made to
//!   fail or to be disabled
//! - [`RecordingSessionHandler`]: records session hook invocations
//! - [`StaticProducer`]: a producer with a fixed set of kinds
//!
//! Every fake counts its `is_enabled` calls so tests can assert that
//! enablement is evaluated once.
//!
//! # Example
//!
//! ```
//! use testhost_extension::testing::{Script, ScriptedFramework};
//! use testhost_extension::{DiscoveryContext, TestFramework};
//! use testhost_types::SessionUid;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let framework = ScriptedFramework::new()
//!     .with_test("ok", Script::Pass)
//!     .with_test("bad", Script::mismatch("X", "Y"));
//!
//! let ctx = DiscoveryContext {
//!     session_uid: SessionUid::new(),
//!     filter: None,
//!     cancel: CancellationToken::new(),
//! };
//! let cases = framework.discover(&ctx).await.unwrap();
//! assert_eq!(cases.len(), 2);
//!
//! assert!(framework.execute(&cases[0], CancellationToken::new()).await.is_ok());
//! assert!(framework.execute(&cases[1], CancellationToken::new()).await.is_err());
//! assert_eq!(framework.executed().len(), 2);
//! # });
//! ```

use crate::{
    Capabilities, DataConsumer, DataProducer, DiscoveryContext, Extension, ExtensionError,
    TestCase, TestFailure, TestFramework, TestSessionLifetimeHandler,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use testhost_message::{Message, MessageKind};
use testhost_types::{ExtensionId, SessionUid, TestNodeUid};
use tokio_util::sync::CancellationToken;

/// What a scripted test body does.
#[derive(Debug, Clone)]
pub enum Script {
    Pass,
    /// Fails with an expected/actual assertion.
    Mismatch { expected: String, actual: String },
    /// Fails with a non-assertion error.
    Throw { type_name: String, message: String },
    /// Fails before the body could run.
    Infrastructure(String),
    /// Panics inside the body.
    Panic(String),
    /// Sleeps, then follows the inner script. Cancellation ends the sleep.
    Sleep(Duration, Box<Script>),
    /// Waits until cancelled.
    Hang,
}

impl Script {
    #[must_use]
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Mismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    #[must_use]
    pub fn throw(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Throw {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Sleeps for `ms` milliseconds, then passes.
    #[must_use]
    pub fn sleep_ms(ms: u64) -> Self {
        Self::Sleep(Duration::from_millis(ms), Box::new(Self::Pass))
    }
}

/// Decrements the running counter on every exit path, panics included.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A framework whose tests follow scripts.
pub struct ScriptedFramework {
    id: ExtensionId,
    enabled: bool,
    capabilities: Capabilities,
    cases: Vec<TestCase>,
    scripts: HashMap<TestNodeUid, Script>,
    discover_error: Option<ExtensionError>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    enablement_calls: AtomicUsize,
    executed: Mutex<Vec<TestNodeUid>>,
    sessions: Mutex<Vec<String>>,
}

impl Default for ScriptedFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFramework {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExtensionId::new("framework", "scripted"),
            enabled: true,
            capabilities: Capabilities::none(),
            cases: Vec::new(),
            scripts: HashMap::new(),
            discover_error: None,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            enablement_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Adds a test named `uid` following `script`.
    #[must_use]
    pub fn with_test(self, uid: &str, script: Script) -> Self {
        self.with_case(TestCase::new(uid, uid), script)
    }

    /// Adds a fully described case.
    #[must_use]
    pub fn with_case(mut self, case: TestCase, script: Script) -> Self {
        self.scripts.insert(case.uid.clone(), script);
        self.cases.push(case);
        self
    }

    /// Adds a statically skipped test.
    #[must_use]
    pub fn with_skipped(self, uid: &str, reason: Option<&str>) -> Self {
        self.with_case(
            TestCase::new(uid, uid).skipped(reason.map(str::to_string)),
            Script::Pass,
        )
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: ExtensionId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Makes discovery fail with `err`.
    #[must_use]
    pub fn failing_discovery(mut self, err: ExtensionError) -> Self {
        self.discover_error = Some(err);
        self
    }

    /// Peak number of bodies running at the same time.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Bodies running right now.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Uids whose body was entered, in entry order.
    #[must_use]
    pub fn executed(&self) -> Vec<TestNodeUid> {
        self.executed.lock().clone()
    }

    /// Session hook log (`create:<uid>`, `close:<uid>`).
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().clone()
    }

    #[must_use]
    pub fn enablement_calls(&self) -> usize {
        self.enablement_calls.load(Ordering::SeqCst)
    }

    async fn follow(script: &Script, cancel: &CancellationToken) -> Result<(), TestFailure> {
        let mut current = script;
        loop {
            match current {
                Script::Pass => return Ok(()),
                Script::Mismatch { expected, actual } => {
                    return Err(TestFailure::mismatch(expected.clone(), actual.clone()))
                }
                Script::Throw { type_name, message } => {
                    return Err(TestFailure::exception(type_name.clone(), message.clone()))
                }
                Script::Infrastructure(message) => {
                    return Err(TestFailure::Infrastructure(message.clone()))
                }
                Script::Panic(message) => panic!("{}", message),
                Script::Sleep(duration, then) => {
                    tokio::select! {
                        _ = tokio::time::sleep(*duration) => current = then,
                        _ = cancel.cancelled() => return Err(TestFailure::Cancelled),
                    }
                }
                Script::Hang => {
                    cancel.cancelled().await;
                    return Err(TestFailure::Cancelled);
                }
            }
        }
    }
}

#[async_trait]
impl Extension for ScriptedFramework {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Scripted framework"
    }

    async fn is_enabled(&self) -> bool {
        self.enablement_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled
    }
}

#[async_trait]
impl TestFramework for ScriptedFramework {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    async fn create_session(&self, session_uid: SessionUid) -> Result<(), ExtensionError> {
        self.sessions.lock().push(format!("create:{}", session_uid));
        Ok(())
    }

    async fn close_session(&self, session_uid: SessionUid) -> Result<(), ExtensionError> {
        self.sessions.lock().push(format!("close:{}", session_uid));
        Ok(())
    }

    async fn discover(&self, ctx: &DiscoveryContext) -> Result<Vec<TestCase>, ExtensionError> {
        if let Some(err) = &self.discover_error {
            return Err(err.clone());
        }
        Ok(self
            .cases
            .iter()
            .filter(|case| ctx.filter.as_ref().map_or(true, |f| f.matches(case)))
            .cloned()
            .collect())
    }

    async fn execute(&self, case: &TestCase, cancel: CancellationToken) -> Result<(), TestFailure> {
        let script = self
            .scripts
            .get(&case.uid)
            .ok_or_else(|| TestFailure::Infrastructure(format!("no script for {}", case.uid)))?;

        self.executed.lock().push(case.uid.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        Self::follow(script, &cancel).await
    }
}

/// A consumer that records what it receives.
pub struct RecordingConsumer {
    id: ExtensionId,
    kinds: Vec<MessageKind>,
    enabled: bool,
    fail: bool,
    delay: Option<Duration>,
    enablement_calls: AtomicUsize,
    received: Mutex<Vec<(ExtensionId, Message)>>,
}

impl RecordingConsumer {
    /// Creates a consumer accepting `kinds`, identified as `reporter::<name>`.
    #[must_use]
    pub fn new(name: &str, kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        Self {
            id: ExtensionId::new("reporter", name),
            kinds: kinds.into_iter().collect(),
            enabled: true,
            fail: false,
            delay: None,
            enablement_calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Every `consume` call records the message, then fails.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Sleeps before recording each message.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Messages received so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.received.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Producers of the messages received so far.
    #[must_use]
    pub fn producers(&self) -> Vec<ExtensionId> {
        self.received.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }

    #[must_use]
    pub fn enablement_calls(&self) -> usize {
        self.enablement_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extension for RecordingConsumer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Recording consumer"
    }

    async fn is_enabled(&self) -> bool {
        self.enablement_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled
    }
}

#[async_trait]
impl DataConsumer for RecordingConsumer {
    fn consumed_kinds(&self) -> Vec<MessageKind> {
        self.kinds.clone()
    }

    async fn consume(&self, producer: &ExtensionId, message: &Message) -> Result<(), ExtensionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.received.lock().push((producer.clone(), message.clone()));
        if self.fail {
            return Err(ExtensionError::failed("recording consumer configured to fail"));
        }
        Ok(())
    }
}

/// A session handler that records hook calls as `starting:<uid>` /
/// `finishing:<uid>`.
pub struct RecordingSessionHandler {
    id: ExtensionId,
    enabled: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordingSessionHandler {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: ExtensionId::new("handler", name),
            enabled: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Extension for RecordingSessionHandler {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Recording session handler"
    }

    async fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl TestSessionLifetimeHandler for RecordingSessionHandler {
    async fn on_session_starting(
        &self,
        session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        self.calls.lock().push(format!("starting:{}", session_uid));
        Ok(())
    }

    async fn on_session_finishing(
        &self,
        session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        self.calls.lock().push(format!("finishing:{}", session_uid));
        Ok(())
    }
}

/// A producer with a fixed set of kinds.
pub struct StaticProducer {
    id: ExtensionId,
    kinds: Vec<MessageKind>,
}

impl StaticProducer {
    #[must_use]
    pub fn new(name: &str, kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        Self {
            id: ExtensionId::new("producer", name),
            kinds: kinds.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Extension for StaticProducer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Static producer"
    }
}

impl DataProducer for StaticProducer {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        self.kinds.clone()
    }
}
