//! Execution coordinator.
//!
//! Runs a batch of discovered tests under a concurrency gate and publishes
//! exactly one terminal [`TestNodeUpdate`] per test.
//!
//! ```text
//! for case in cases:
//!   skipped? ──► publish Skipped (no slot, no task)
//!   gate.acquire ──(cancelled)──► publish Cancelled (never ran)
//!        │
//!        ▼
//!   spawn ─► Deadline ─► catch_unwind(framework.execute) ─► classify ─► publish
//!                                                                       │
//!   permit dropped on every exit path ◄─────────────────────────────────┘
//!
//! await every task ─► write report ─► publish SessionArtifact ─► RunSummary
//! ```
//!
//! A [`TerminalLedger`] records which tests already received a terminal
//! update; a second terminal update for the same test is dropped with a
//! warning.

use super::classify::{classify, panic_message, ExecutionOutcome};
use super::gate::ConcurrencyGate;
use super::report::RunReport;
use super::summary::{GateUsage, RunSummary};
use crate::bus::MessageBus;
use crate::deadline::{Deadline, DeadlineError};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use testhost_extension::{async_trait, DataProducer, Extension, TestCase, TestFramework};
use testhost_message::{Message, MessageKind, SessionArtifact, TestNode, TestNodeState, TestNodeUpdate};
use testhost_types::{ExtensionId, SessionUid, TestNodeUid};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Display name of the run report artifact.
pub const REPORT_ARTIFACT_NAME: &str = "Run report";

/// Settings for one coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Maximum concurrently running bodies. `None` is unbounded.
    pub parallelism: Option<usize>,
    /// Timeout for tests that do not carry their own.
    pub default_timeout: Option<Duration>,
    /// Where to write the run report. `None` disables it.
    pub report_path: Option<PathBuf>,
}

/// Identity the coordinator publishes under.
#[derive(Debug)]
pub struct CoordinatorProducer {
    id: ExtensionId,
}

impl CoordinatorProducer {
    /// Kinds published by the coordinator.
    pub const KINDS: [MessageKind; 2] = [MessageKind::TestNodeUpdate, MessageKind::SessionArtifact];

    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExtensionId::builtin("coordinator"),
        }
    }
}

impl Default for CoordinatorProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for CoordinatorProducer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Execution coordinator"
    }
}

impl DataProducer for CoordinatorProducer {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        Self::KINDS.to_vec()
    }
}

/// Records which tests reached a terminal state.
#[derive(Debug, Default)]
pub struct TerminalLedger {
    seen: Mutex<HashSet<TestNodeUid>>,
}

impl TerminalLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `uid` terminal. Returns `false` if it already was.
    pub fn settle(&self, uid: &TestNodeUid) -> bool {
        self.seen.lock().insert(uid.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Shared by the coordinator loop and every spawned test task.
struct Publisher {
    session_uid: SessionUid,
    bus: MessageBus,
    producer: Arc<CoordinatorProducer>,
    report: RunReport,
    ledger: TerminalLedger,
}

impl Publisher {
    /// Publishes the terminal state of `case` once.
    async fn settle(
        &self,
        case: &TestCase,
        state: TestNodeState,
        elapsed: Option<Duration>,
    ) -> Option<TestNodeState> {
        if !self.ledger.settle(&case.uid) {
            warn!(test = %case.uid, state = state.label(), "Test already settled, update dropped");
            return None;
        }

        self.report.record(&case.uid, &state);

        let mut node = TestNode::discovered(case.uid.clone(), case.display_name.clone())
            .with_state(state.clone());
        node.properties = case.properties.clone();
        if let Some(elapsed) = elapsed {
            node = node.with_duration_ms(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        }

        let message = Message::TestNodeUpdate(TestNodeUpdate {
            session_uid: self.session_uid,
            node,
        });
        if let Err(e) = self.bus.publish(self.producer.as_ref(), message).await {
            error!(test = %case.uid, error = %e, "Failed to publish test result");
        }
        Some(state)
    }
}

/// Runs tests against one framework.
pub struct ExecutionCoordinator {
    framework: Arc<dyn TestFramework>,
    bus: MessageBus,
    producer: Arc<CoordinatorProducer>,
    options: CoordinatorOptions,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(framework: Arc<dyn TestFramework>, bus: MessageBus, options: CoordinatorOptions) -> Self {
        Self {
            framework,
            bus,
            producer: Arc::new(CoordinatorProducer::new()),
            options,
        }
    }

    /// Producer identity used for published messages.
    #[must_use]
    pub fn producer(&self) -> &CoordinatorProducer {
        &self.producer
    }

    #[must_use]
    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Executes `cases` and returns once every one of them is settled.
    ///
    /// Cancelling `cancel` stops new bodies from starting; running bodies
    /// observe it through their token and are settled as `Cancelled`.
    pub async fn run(
        &self,
        session_uid: SessionUid,
        cases: Vec<TestCase>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let started = Instant::now();
        let gate = ConcurrencyGate::new(self.options.parallelism);
        let publisher = Arc::new(Publisher {
            session_uid,
            bus: self.bus.clone(),
            producer: Arc::clone(&self.producer),
            report: RunReport::new(),
            ledger: TerminalLedger::new(),
        });

        info!(
            session = %session_uid,
            tests = cases.len(),
            parallelism = ?self.options.parallelism,
            "Executing tests"
        );

        let mut summary = RunSummary::new();
        let mut tasks = JoinSet::new();

        for case in cases {
            if let Some(skip) = &case.skip {
                let state = TestNodeState::Skipped {
                    reason: skip.reason.clone(),
                };
                if let Some(state) = publisher.settle(&case, state, None).await {
                    summary.record(&state);
                }
                continue;
            }

            let permit = match gate.acquire(cancel).await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(test = %case.uid, "Run cancelled before test started");
                    if let Some(state) = publisher.settle(&case, TestNodeState::Cancelled, None).await {
                        summary.record(&state);
                    }
                    continue;
                }
            };

            let framework = Arc::clone(&self.framework);
            let publisher = Arc::clone(&publisher);
            let timeout = case.timeout.or(self.options.default_timeout);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let deadline = Deadline::new(&cancel, timeout);
                let body_started = Instant::now();

                let body = AssertUnwindSafe(framework.execute(&case, deadline.token())).catch_unwind();
                let outcome = match deadline.run(body).await {
                    Ok(Ok(result)) => ExecutionOutcome::Completed(result),
                    Ok(Err(payload)) => ExecutionOutcome::Panicked(panic_message(payload.as_ref())),
                    Err(DeadlineError::Cancelled) => ExecutionOutcome::Cancelled,
                    Err(DeadlineError::Timeout(after)) => ExecutionOutcome::TimedOut(after),
                };
                let state = classify(outcome);
                debug!(test = %case.uid, state = state.label(), "Test finished");

                publisher.settle(&case, state, Some(body_started.elapsed())).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(state)) => summary.record(&state),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Test task failed to complete"),
            }
        }

        summary.gate = Some(GateUsage {
            capacity: gate.capacity(),
            available: gate.available(),
        });
        if !summary.gate.is_some_and(|usage| usage.is_idle()) {
            error!(session = %session_uid, usage = ?summary.gate, "Concurrency gate slots not returned");
        }

        if let Some(path) = &self.options.report_path {
            summary.report_path = self.write_report(session_uid, &publisher, path).await;
        }

        summary.aborted = cancel.is_cancelled();
        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(session = %session_uid, summary = %summary, "Execution finished");
        summary
    }

    async fn write_report(
        &self,
        session_uid: SessionUid,
        publisher: &Publisher,
        path: &Path,
    ) -> Option<PathBuf> {
        if let Err(e) = publisher.report.write_to(path).await {
            error!(path = %path.display(), error = %e, "Failed to write run report");
            return None;
        }

        let artifact = Message::SessionArtifact(SessionArtifact {
            session_uid,
            path: path.to_path_buf(),
            display_name: REPORT_ARTIFACT_NAME.to_string(),
            description: Some(format!("{} test outcomes", publisher.ledger.len())),
        });
        if let Err(e) = self.bus.publish(self.producer.as_ref(), artifact).await {
            error!(error = %e, "Failed to publish run report artifact");
        }
        Some(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBusBuilder;
    use testhost_extension::testing::{RecordingConsumer, Script, ScriptedFramework};
    use testhost_extension::{DataConsumer, DiscoveryContext};

    struct Harness {
        framework: Arc<ScriptedFramework>,
        consumer: Arc<RecordingConsumer>,
        bus: MessageBus,
    }

    fn harness(framework: ScriptedFramework) -> Harness {
        let framework = Arc::new(framework);
        let consumer = Arc::new(RecordingConsumer::new(
            "recorder",
            [MessageKind::TestNodeUpdate, MessageKind::SessionArtifact],
        ));
        let bus = MessageBusBuilder::new()
            .consumer(Arc::clone(&consumer) as Arc<dyn DataConsumer>)
            .producer(&CoordinatorProducer::new())
            .build();
        Harness {
            framework,
            consumer,
            bus,
        }
    }

    async fn cases(framework: &ScriptedFramework) -> Vec<TestCase> {
        let ctx = DiscoveryContext {
            session_uid: SessionUid::new(),
            filter: None,
            cancel: CancellationToken::new(),
        };
        framework.discover(&ctx).await.expect("discover")
    }

    fn states(consumer: &RecordingConsumer) -> Vec<(String, TestNodeState)> {
        consumer
            .messages()
            .iter()
            .filter_map(Message::as_node_update)
            .map(|u| (u.node.uid.to_string(), u.node.state.clone()))
            .collect()
    }

    #[tokio::test]
    async fn each_test_settles_once() {
        let h = harness(
            ScriptedFramework::new()
                .with_test("pass", Script::Pass)
                .with_test("fail", Script::mismatch("X", "Y"))
                .with_test("boom", Script::Panic("kaboom".into()))
                .with_skipped("skip", Some("later")),
        );
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions::default(),
        );

        let summary = coordinator
            .run(SessionUid::new(), cases(&h.framework).await, &CancellationToken::new())
            .await;
        h.bus.drain().await;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.skipped, 1);

        let mut seen = states(&h.consumer);
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        let uids: Vec<_> = seen.iter().map(|(uid, _)| uid.as_str()).collect();
        assert_eq!(uids, ["boom", "fail", "pass", "skip"]);

        // Skipped tests never reach the framework.
        assert!(!h.framework.executed().iter().any(|u| u.as_str() == "skip"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallelism_bounds_running_bodies() {
        let mut framework = ScriptedFramework::new();
        for i in 0..6 {
            framework = framework.with_test(&format!("t{}", i), Script::sleep_ms(30));
        }
        let h = harness(framework);
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions {
                parallelism: Some(2),
                ..Default::default()
            },
        );

        let summary = coordinator
            .run(SessionUid::new(), cases(&h.framework).await, &CancellationToken::new())
            .await;

        assert_eq!(summary.passed, 6);
        assert!(h.framework.max_concurrency() <= 2);
        assert_eq!(h.framework.running(), 0);
    }

    #[tokio::test]
    async fn timeout_and_default_timeout() {
        let h = harness(ScriptedFramework::new().with_test("slow", Script::Hang));
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions {
                default_timeout: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        );

        let summary = coordinator
            .run(SessionUid::new(), cases(&h.framework).await, &CancellationToken::new())
            .await;
        h.bus.drain().await;

        assert_eq!(summary.timed_out, 1);
        assert!(!summary.aborted);
        assert_eq!(
            states(&h.consumer),
            vec![("slow".to_string(), TestNodeState::Timeout { after_ms: 20 })]
        );
    }

    #[tokio::test]
    async fn cancellation_settles_running_and_pending() {
        let h = harness(
            ScriptedFramework::new()
                .with_test("a", Script::Hang)
                .with_test("b", Script::Hang),
        );
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions {
                parallelism: Some(1),
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let summary = coordinator
            .run(SessionUid::new(), cases(&h.framework).await, &cancel)
            .await;

        assert_eq!(summary.cancelled, 2);
        assert!(summary.aborted);
        assert_eq!(summary.exit_code(), testhost_types::ExitCode::TestSessionAborted);
        assert_eq!(h.framework.executed().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_uids_settle_once() {
        let h = harness(ScriptedFramework::new().with_test("dup", Script::Pass));
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions::default(),
        );
        let mut batch = cases(&h.framework).await;
        batch.push(batch[0].clone());

        let summary = coordinator
            .run(SessionUid::new(), batch, &CancellationToken::new())
            .await;
        h.bus.drain().await;

        assert_eq!(summary.total, 1);
        assert_eq!(states(&h.consumer).len(), 1);
    }

    #[tokio::test]
    async fn report_written_and_published() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        let h = harness(
            ScriptedFramework::new()
                .with_test("ok", Script::Pass)
                .with_skipped("skip", None),
        );
        let coordinator = ExecutionCoordinator::new(
            h.framework.clone(),
            h.bus.clone(),
            CoordinatorOptions {
                report_path: Some(path.clone()),
                ..Default::default()
            },
        );

        let summary = coordinator
            .run(SessionUid::new(), cases(&h.framework).await, &CancellationToken::new())
            .await;
        h.bus.drain().await;

        assert_eq!(summary.report_path.as_deref(), Some(path.as_path()));
        let text = std::fs::read_to_string(&path).expect("report");
        assert!(text.contains("Test ok passed"));
        assert!(text.contains("Test skip skipped"));

        let artifacts: Vec<_> = h
            .consumer
            .messages()
            .into_iter()
            .filter(|m| m.kind() == MessageKind::SessionArtifact)
            .collect();
        assert_eq!(artifacts.len(), 1);
    }
}
