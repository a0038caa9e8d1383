//! Integration tests for the execution pipeline.
//!
//! Tests the complete flow of:
//! - ExtensionRegistry resolving frameworks and consumers
//! - MessageBus routing by declared kind
//! - TestSession driving the ExecutionCoordinator
//! - Run report and exit code mapping

use std::sync::Arc;
use std::time::Duration;
use testhost_extension::testing::{RecordingConsumer, Script, ScriptedFramework};
use testhost_extension::{DataConsumer, TestFramework, TestSessionLifetimeHandler};
use testhost_message::{Message, MessageKind, TestNodeState};
use testhost_runtime::execution::{CoordinatorOptions, CoordinatorProducer, GateUsage};
use testhost_runtime::session::SessionProducer;
use testhost_runtime::{
    ExtensionRegistry, MessageBus, MessageBusBuilder, SessionContext, SessionOutcome,
    SessionRequest, TestSession,
};
use testhost_types::ExitCode;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Fixtures
// =============================================================================

fn bus_for(consumers: &[Arc<RecordingConsumer>]) -> MessageBus {
    let mut builder = MessageBusBuilder::new()
        .producer(&CoordinatorProducer::new())
        .producer(&SessionProducer::new());
    for consumer in consumers {
        builder = builder.consumer(Arc::clone(consumer) as Arc<dyn DataConsumer>);
    }
    builder.build()
}

fn context(
    framework: &Arc<ScriptedFramework>,
    bus: MessageBus,
    options: CoordinatorOptions,
) -> SessionContext {
    SessionContext {
        framework: Arc::clone(framework) as Arc<dyn TestFramework>,
        bus,
        handlers: Vec::<Arc<dyn TestSessionLifetimeHandler>>::new(),
        coordinator: options,
        filter: None,
    }
}

async fn run_once(ctx: SessionContext) -> SessionOutcome {
    let cancel = CancellationToken::new();
    let mut session = TestSession::create(ctx, &cancel).await.expect("create");
    let outcome = session
        .execute(SessionRequest::Run, &cancel)
        .await
        .expect("run");
    session.close(&cancel).await.expect("close");
    outcome
}

fn terminal_states(consumer: &RecordingConsumer) -> Vec<(String, TestNodeState)> {
    let mut states: Vec<_> = consumer
        .messages()
        .iter()
        .filter_map(Message::as_node_update)
        .filter(|u| u.node.state.is_terminal())
        .map(|u| (u.node.uid.to_string(), u.node.state.clone()))
        .collect();
    states.sort_by(|a, b| a.0.cmp(&b.0));
    states
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_tests_two_slots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = dir.path().join("report.txt");
    let mut framework = ScriptedFramework::new();
    for i in 0..5 {
        framework = framework.with_test(&format!("t{}", i), Script::sleep_ms(25));
    }
    let framework = Arc::new(framework);
    let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));

    let outcome = run_once(context(
        &framework,
        bus_for(&[Arc::clone(&consumer)]),
        CoordinatorOptions {
            parallelism: Some(2),
            report_path: Some(report.clone()),
            ..Default::default()
        },
    ))
    .await;

    let summary = outcome.summary().expect("run summary");
    assert_eq!(summary.passed, 5);
    assert!(framework.max_concurrency() <= 2);
    assert_eq!(std::fs::read_to_string(&report).expect("report").lines().count(), 5);
    assert_eq!(terminal_states(&consumer).len(), 5);
    assert_eq!(outcome.exit_code(), ExitCode::Success);
}

#[tokio::test]
async fn assertion_mismatch_is_failed() {
    let framework = Arc::new(ScriptedFramework::new().with_test("cmp", Script::mismatch("X", "Y")));
    let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));

    let outcome = run_once(context(
        &framework,
        bus_for(&[Arc::clone(&consumer)]),
        CoordinatorOptions::default(),
    ))
    .await;

    let states = terminal_states(&consumer);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].1.label(), "failed");
    assert_eq!(states[0].1.message(), Some("Expected: X, Actual: Y"));
    assert_eq!(outcome.exit_code(), ExitCode::AtLeastOneTestFailed);
}

#[tokio::test]
async fn skipped_test_never_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = dir.path().join("report.txt");
    let framework = Arc::new(ScriptedFramework::new().with_skipped("later", Some("flaky")));
    let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));

    let outcome = run_once(context(
        &framework,
        bus_for(&[Arc::clone(&consumer)]),
        CoordinatorOptions {
            parallelism: Some(1),
            report_path: Some(report.clone()),
            ..Default::default()
        },
    ))
    .await;

    assert_eq!(
        terminal_states(&consumer),
        vec![(
            "later".to_string(),
            TestNodeState::Skipped {
                reason: Some("flaky".into())
            }
        )]
    );
    assert!(framework.executed().is_empty());
    assert_eq!(
        std::fs::read_to_string(&report).expect("report"),
        "Test later skipped\n"
    );
    assert_eq!(outcome.exit_code(), ExitCode::ZeroTests);
    assert_eq!(
        outcome.summary().expect("summary").gate,
        Some(GateUsage {
            capacity: 1,
            available: 1
        })
    );
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_test_settles_exactly_once() {
    let scripts = [
        Script::Pass,
        Script::mismatch("1", "2"),
        Script::throw("io", "closed"),
        Script::Infrastructure("no fixture".into()),
        Script::Panic("boom".into()),
        Script::sleep_ms(5),
        Script::Hang,
    ];
    let mut framework = ScriptedFramework::new().with_skipped("skipped", None);
    for i in 0..28 {
        framework = framework.with_test(&format!("t{:02}", i), scripts[i % scripts.len()].clone());
    }
    let framework = Arc::new(framework);
    let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));

    let outcome = run_once(context(
        &framework,
        bus_for(&[Arc::clone(&consumer)]),
        CoordinatorOptions {
            parallelism: Some(3),
            default_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        },
    ))
    .await;

    let states = terminal_states(&consumer);
    let mut uids: Vec<_> = states.iter().map(|(uid, _)| uid.clone()).collect();
    uids.dedup();
    assert_eq!(uids.len(), 29);
    assert_eq!(states.len(), 29);

    let summary = outcome.summary().expect("summary");
    assert_eq!(summary.total, 29);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.timed_out, 4);
    assert_eq!(framework.running(), 0);
    assert_eq!(
        summary.gate,
        Some(GateUsage {
            capacity: 3,
            available: 3
        })
    );
}

#[tokio::test]
async fn consumers_only_see_declared_kinds() {
    let framework = Arc::new(ScriptedFramework::new().with_test("a", Script::Pass));
    let nodes = Arc::new(RecordingConsumer::new("nodes", [MessageKind::TestNodeUpdate]));
    let artifacts = Arc::new(RecordingConsumer::new("artifacts", [MessageKind::SessionArtifact]));
    let dir = tempfile::tempdir().expect("tempdir");

    run_once(context(
        &framework,
        bus_for(&[Arc::clone(&nodes), Arc::clone(&artifacts)]),
        CoordinatorOptions {
            report_path: Some(dir.path().join("r.txt")),
            ..Default::default()
        },
    ))
    .await;

    assert!(nodes
        .messages()
        .iter()
        .all(|m| m.kind() == MessageKind::TestNodeUpdate));
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts
        .messages()
        .iter()
        .all(|m| m.kind() == MessageKind::SessionArtifact));
}

#[tokio::test]
async fn failing_consumer_is_isolated() {
    let framework = Arc::new(
        ScriptedFramework::new()
            .with_test("a", Script::Pass)
            .with_test("b", Script::Pass),
    );
    let broken = Arc::new(RecordingConsumer::new("broken", [MessageKind::TestNodeUpdate]).failing());
    let healthy = Arc::new(RecordingConsumer::new("healthy", [MessageKind::TestNodeUpdate]));

    let outcome = run_once(context(
        &framework,
        bus_for(&[Arc::clone(&broken), Arc::clone(&healthy)]),
        CoordinatorOptions::default(),
    ))
    .await;

    assert_eq!(outcome.exit_code(), ExitCode::Success);
    assert_eq!(healthy.len(), 2);
}

#[tokio::test]
async fn registry_excludes_disabled_consumer_from_bus() {
    let mut registry = ExtensionRegistry::new();
    let framework = Arc::new(ScriptedFramework::new().with_test("a", Script::Pass));
    let enabled = Arc::new(RecordingConsumer::new("on", [MessageKind::TestNodeUpdate]));
    let disabled = Arc::new(RecordingConsumer::new("off", [MessageKind::TestNodeUpdate]).disabled());
    {
        let framework = Arc::clone(&framework);
        registry.add_framework(move || framework as Arc<dyn TestFramework>);
    }
    {
        let enabled = Arc::clone(&enabled);
        registry.add_consumer(move || enabled as Arc<dyn DataConsumer>);
    }
    {
        let disabled = Arc::clone(&disabled);
        registry.add_consumer(move || disabled as Arc<dyn DataConsumer>);
    }

    let resolved = registry.resolve().await.expect("resolve");
    let mut builder = MessageBusBuilder::new()
        .producer(&CoordinatorProducer::new())
        .producer(&SessionProducer::new());
    for consumer in &resolved.consumers {
        builder = builder.consumer(Arc::clone(consumer));
    }
    let ctx = SessionContext {
        framework: resolved.framework().cloned().expect("framework"),
        bus: builder.build(),
        handlers: resolved.session_handlers.clone(),
        coordinator: CoordinatorOptions::default(),
        filter: None,
    };

    run_once(ctx).await;

    assert_eq!(enabled.len(), 1);
    assert!(disabled.is_empty());
    assert_eq!(disabled.enablement_calls(), 1);
}
