//! Integration tests for test host process lifetime.
//!
//! Spawns real `sh` children, so the whole file is unix-only.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;
use testhost_extension::testing::RecordingConsumer;
use testhost_extension::{DataConsumer, EnvironmentVariableProvider, ProcessLifetimeHandler};
use testhost_message::{Message, MessageKind};
use testhost_runtime::config::CrashDumpConfig;
use testhost_runtime::process::{CrashDumpHandler, ProcessLauncher, ProcessSpec};
use testhost_runtime::{HangMonitor, MessageBus, MessageBusBuilder};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Fixtures
// =============================================================================

/// Writes the dump the runtime would write, then exits with `code`.
const CRASH_WITH_DUMP: &str =
    r#"f=$(printf %s "$DOTNET_DbgMiniDumpName" | sed "s/%p/$$/"); : > "$f"; exit 3"#;

struct Harness {
    _dir: tempfile::TempDir,
    dumps: std::path::PathBuf,
    handler: Arc<CrashDumpHandler>,
    artifacts: Arc<RecordingConsumer>,
    bus: MessageBus,
    launcher: ProcessLauncher,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let dumps = dir.path().join("dumps");
    let handler = Arc::new(CrashDumpHandler::new(
        CrashDumpConfig {
            enabled: true,
            ..Default::default()
        },
        &dumps,
    ));
    let artifacts = Arc::new(RecordingConsumer::new("dumps", [MessageKind::FileArtifact]));
    let bus = MessageBusBuilder::new()
        .producer(&*handler)
        .consumer(Arc::clone(&artifacts) as Arc<dyn DataConsumer>)
        .build();
    let launcher = ProcessLauncher::new(
        vec![Arc::clone(&handler) as Arc<dyn EnvironmentVariableProvider>],
        vec![Arc::clone(&handler) as Arc<dyn ProcessLifetimeHandler>],
    );
    Harness {
        _dir: dir,
        dumps,
        handler,
        artifacts,
        bus,
        launcher,
    }
}

fn artifact_paths(consumer: &RecordingConsumer) -> Vec<std::path::PathBuf> {
    consumer
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            Message::FileArtifact(a) => Some(a.path),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Crash dumps
// =============================================================================

#[tokio::test]
async fn ungraceful_exit_publishes_expected_dump() {
    let h = harness();
    let spec = ProcessSpec::new("sh").args(["-c", CRASH_WITH_DUMP]).quiet();

    let mut process = h.launcher.launch(&spec).await.expect("launch");
    let pid = process.pid();
    let code = process.wait().await.expect("wait");
    let record = process.finish(code, false, &h.bus).await;
    h.bus.drain().await;

    assert_eq!(record.exit_code, Some(3));
    assert!(record.is_ungraceful());
    assert_eq!(artifact_paths(&h.artifacts), vec![h.handler.expected_dump(pid)]);
}

#[tokio::test]
async fn missing_dump_falls_back_to_directory_scan() {
    let h = harness();
    std::fs::create_dir_all(&h.dumps).expect("mkdir");
    std::fs::write(h.dumps.join("b.dmp"), b"").expect("write");
    std::fs::write(h.dumps.join("a.dmp"), b"").expect("write");
    std::fs::write(h.dumps.join("notes.txt"), b"").expect("write");
    let spec = ProcessSpec::new("sh").args(["-c", "exit 9"]).quiet();

    let mut process = h.launcher.launch(&spec).await.expect("launch");
    let code = process.wait().await.expect("wait");
    process.finish(code, false, &h.bus).await;
    h.bus.drain().await;

    assert_eq!(
        artifact_paths(&h.artifacts),
        vec![h.dumps.join("a.dmp"), h.dumps.join("b.dmp")]
    );
}

#[tokio::test]
async fn graceful_exit_publishes_nothing() {
    let h = harness();
    let spec = ProcessSpec::new("sh").args(["-c", CRASH_WITH_DUMP]).quiet();

    let mut process = h.launcher.launch(&spec).await.expect("launch");
    let code = process.wait().await.expect("wait");
    let record = process.finish(code, true, &h.bus).await;
    h.bus.drain().await;

    assert!(!record.is_ungraceful());
    assert!(h.artifacts.is_empty());
}

#[tokio::test]
async fn child_sees_dump_variables() {
    let h = harness();
    let check = format!(
        r#"test "$DOTNET_DbgEnableMiniDump" = 1 && test "$COMPlus_DbgMiniDumpName" = "{}""#,
        h.handler.dump_pattern().display()
    );
    let spec = ProcessSpec::new("sh").args(["-c", check.as_str()]).quiet();

    let mut process = h.launcher.launch(&spec).await.expect("launch");
    assert_eq!(process.wait().await.expect("wait"), Some(0));
}

// =============================================================================
// Hang detection
// =============================================================================

#[tokio::test]
async fn silent_host_is_detected_and_killed() {
    let h = harness();
    let spec = ProcessSpec::new("sh").args(["-c", "sleep 30"]).quiet();
    let monitor = HangMonitor::new(Duration::from_millis(100));

    let mut process = h.launcher.launch(&spec).await.expect("launch");
    let idle = monitor
        .hung(&CancellationToken::new())
        .await
        .expect("hang reported");
    assert!(idle >= Duration::from_millis(100));

    process.kill().await;
    let code = process.wait().await.expect("wait");
    let record = process.finish(code, false, &h.bus).await;

    assert_eq!(record.exit_code, None);
    assert!(record.is_ungraceful());
}
