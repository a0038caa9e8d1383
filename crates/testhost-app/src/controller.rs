//! Out-of-process orchestration of a test host.
//!
//! # Flow
//!
//! ```text
//! bind pipe ─► launch child (TESTHOST_PIPE_NAME injected)
//!    │
//!    ├── serve task: accept ─► handle requests, touch HangMonitor,
//!    │               republish forwarded results on the bus
//!    │
//!    └── wait for the first of:
//!          child exit ─────────────► graceful if it announced its exit
//!          hang (no IPC traffic) ──► kill, ungraceful
//!          cancellation ───────────► kill, aborted
//!    │
//! finish: lifetime handlers (crash dumps) ─► drain bus ─► exit code
//! ```
//!
//! | Outcome | Exit code |
//! |---------|-----------|
//! | cancelled | `TestSessionAborted` |
//! | hang, crash, or exit without `TestHostExitRequest` | `TestHostProcessExitedNonGracefully` |
//! | announced exit | the code the host announced |

use crate::AppError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use testhost_extension::{
    async_trait, DataProducer, EnvironmentVariable, EnvironmentVariableProvider,
    EnvironmentVariables, Extension, ExtensionError, ProcessLifetimeHandler, ProcessLifetimeRecord,
};
use testhost_message::{Message, MessageKind, TestNodeUpdate};
use testhost_runtime::ipc::{
    generate_pipe_name, protocol_compatible, IpcReply, IpcRequest, ModuleInfoReply,
    RequestHandler, VoidReply, PROTOCOL_VERSION,
};
use testhost_runtime::process::{ProcessLauncher, ProcessSpec};
use testhost_runtime::{
    HangMonitor, HostConfig, IpcError, IpcServer, MessageBus, RunSummary, SerializerRegistry,
};
use testhost_types::{ExitCode, ExtensionId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable carrying the pipe name to the child.
pub const PIPE_NAME_VAR: &str = "TESTHOST_PIPE_NAME";

/// How long a connected host gets to hang up after it exited.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Identity forwarded results are republished under.
#[derive(Debug)]
pub struct ControllerProducer {
    id: ExtensionId,
}

impl ControllerProducer {
    pub const KINDS: [MessageKind; 1] = [MessageKind::TestNodeUpdate];

    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExtensionId::builtin("controller"),
        }
    }
}

impl Default for ControllerProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for ControllerProducer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Test host controller"
    }
}

impl DataProducer for ControllerProducer {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        Self::KINDS.to_vec()
    }
}

/// Points the child at the controller's pipe.
struct PipeNameProvider {
    id: ExtensionId,
    pipe_name: String,
}

#[async_trait]
impl Extension for PipeNameProvider {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Controller pipe name"
    }
}

#[async_trait]
impl EnvironmentVariableProvider for PipeNameProvider {
    async fn update(&self, env: &mut EnvironmentVariables) -> Result<(), ExtensionError> {
        env.set(EnvironmentVariable::new(PIPE_NAME_VAR, self.pipe_name.clone()).locked())
    }
}

/// What the host told the controller.
#[derive(Debug, Default)]
struct Reported {
    connected: bool,
    pid: Option<u32>,
    results: usize,
    summary: Option<RunSummary>,
    exit_code: Option<i32>,
}

struct HostRequests {
    bus: MessageBus,
    producer: ControllerProducer,
    monitor: Option<Arc<HangMonitor>>,
    reported: Mutex<Reported>,
}

#[async_trait]
impl RequestHandler for HostRequests {
    async fn handle(&self, request: IpcRequest) -> Result<IpcReply, IpcError> {
        if let Some(monitor) = &self.monitor {
            monitor.touch();
        }

        match request {
            IpcRequest::ModuleInfo(info) => {
                if !protocol_compatible(PROTOCOL_VERSION, &info.protocol_version) {
                    warn!(
                        local = PROTOCOL_VERSION,
                        remote = %info.protocol_version,
                        "Test host speaks an incompatible protocol"
                    );
                }
                debug!(module = %info.module_path, host_version = %info.host_version, "Test host connected");
                self.reported.lock().connected = true;
                return Ok(IpcReply::ModuleInfo(ModuleInfoReply::default()));
            }
            IpcRequest::TestHostPid(pid) => {
                self.reported.lock().pid = Some(pid.pid);
            }
            IpcRequest::TestResults(results) => {
                let count = results.nodes.len();
                for node in results.nodes {
                    let update = Message::TestNodeUpdate(TestNodeUpdate {
                        session_uid: results.session_uid,
                        node,
                    });
                    if let Err(e) = self.bus.publish(&self.producer, update).await {
                        warn!(error = %e, "Failed to republish forwarded result");
                    }
                }
                self.reported.lock().results += count;
            }
            IpcRequest::SessionSummary(summary) => {
                info!(session = %summary.session_uid, summary = %summary.summary, "Test host finished a session");
                self.reported.lock().summary = Some(summary.summary);
            }
            IpcRequest::TestHostExit(exit) => {
                debug!(exit_code = exit.exit_code, "Test host announced its exit");
                self.reported.lock().exit_code = Some(exit.exit_code);
            }
        }
        Ok(IpcReply::Void(VoidReply {}))
    }
}

/// Result of one supervised host run.
#[derive(Debug, Clone)]
pub struct ControllerOutcome {
    pub exit_code: ExitCode,
    pub record: ProcessLifetimeRecord,
    /// Summary the host reported, if it got that far.
    pub summary: Option<RunSummary>,
    /// Idle time when the host was declared hung.
    pub hung_after: Option<Duration>,
    /// Number of forwarded test results.
    pub results: usize,
}

enum Ending {
    Exited(Result<Option<i32>, testhost_runtime::ProcessError>),
    Hung(Duration),
    Cancelled,
}

/// Launches and supervises one test host process.
pub struct TestHostController {
    env_providers: Vec<Arc<dyn EnvironmentVariableProvider>>,
    handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
    bus: MessageBus,
    connect_timeout: Duration,
    hang_timeout: Option<Duration>,
}

impl TestHostController {
    #[must_use]
    pub fn new(
        config: &HostConfig,
        env_providers: Vec<Arc<dyn EnvironmentVariableProvider>>,
        handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
        bus: MessageBus,
    ) -> Self {
        Self {
            env_providers,
            handlers,
            bus,
            connect_timeout: config.ipc.connect_timeout(),
            hang_timeout: config.hang.enabled.then(|| config.hang.timeout()),
        }
    }

    /// Runs `spec` as a child test host until it exits.
    ///
    /// # Errors
    ///
    /// Failures to bind the pipe, prepare the environment or spawn the
    /// child. Faults of the child itself are reported through the
    /// outcome's exit code.
    pub async fn run(
        &self,
        spec: &ProcessSpec,
        cancel: &CancellationToken,
    ) -> Result<ControllerOutcome, AppError> {
        let pipe_name = generate_pipe_name();
        let server = IpcServer::bind(&pipe_name, Arc::new(SerializerRegistry::with_protocol()))?;

        let mut env_providers = self.env_providers.clone();
        env_providers.push(Arc::new(PipeNameProvider {
            id: ExtensionId::builtin("controller-pipe"),
            pipe_name: pipe_name.clone(),
        }));
        let launcher = ProcessLauncher::new(env_providers, self.handlers.clone());
        let mut process = launcher.launch(spec).await?;
        let pid = process.pid();

        let monitor = self.hang_timeout.map(|t| Arc::new(HangMonitor::new(t)));
        let requests = Arc::new(HostRequests {
            bus: self.bus.clone(),
            producer: ControllerProducer::new(),
            monitor: monitor.clone(),
            reported: Mutex::new(Reported::default()),
        });

        let serve_cancel = cancel.child_token();
        let mut serving = {
            let requests = Arc::clone(&requests);
            let serve_cancel = serve_cancel.clone();
            let connect_timeout = self.connect_timeout;
            tokio::spawn(async move {
                let connection = server.accept(connect_timeout, &serve_cancel).await?;
                connection.serve(&*requests, &serve_cancel).await
            })
        };

        let hang = async {
            match &monitor {
                Some(monitor) => match monitor.hung(cancel).await {
                    Some(idle) => idle,
                    None => std::future::pending().await,
                },
                None => std::future::pending().await,
            }
        };

        let ending = tokio::select! {
            status = process.wait() => Ending::Exited(status),
            idle = hang => Ending::Hung(idle),
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        let (exit_status, hung_after, aborted) = match ending {
            Ending::Exited(status) => (status?, None, false),
            Ending::Hung(idle) => {
                let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
                warn!(pid, idle_ms, "Test host hung, killing it");
                process.kill().await;
                (process.wait().await?, Some(idle), false)
            }
            Ending::Cancelled => {
                info!(pid, "Run cancelled, killing test host");
                process.kill().await;
                (process.wait().await?, None, true)
            }
        };

        if requests.reported.lock().connected {
            match tokio::time::timeout(DISCONNECT_GRACE, &mut serving).await {
                Ok(Ok(Ok(served))) => debug!(served, "IPC connection closed"),
                Ok(Ok(Err(e))) => warn!(error = %e, "IPC connection ended with an error"),
                Ok(Err(e)) => warn!(error = %e, "IPC serve task failed"),
                Err(_) => {
                    warn!("Test host connection still open after exit");
                    serving.abort();
                }
            }
        } else {
            warn!(pid, "Test host exited without connecting");
            serving.abort();
        }
        serve_cancel.cancel();

        let reported = std::mem::take(&mut *requests.reported.lock());
        if let Some(reported_pid) = reported.pid.filter(|p| *p != pid) {
            debug!(pid, reported_pid, "Test host reported a different process id");
        }
        let graceful = reported.exit_code.is_some() && hung_after.is_none() && !aborted;
        let record = process.finish(exit_status, graceful, &self.bus).await;
        self.bus.drain().await;

        let exit_code = if aborted {
            ExitCode::TestSessionAborted
        } else if !graceful {
            ExitCode::TestHostProcessExitedNonGracefully
        } else {
            reported
                .exit_code
                .map_or(ExitCode::GenericFailure, ExitCode::classify)
        };
        info!(pid, exit_code = %exit_code, graceful, "Test host supervised to completion");

        Ok(ControllerOutcome {
            exit_code,
            record,
            summary: reported.summary,
            hung_after,
            results: reported.results,
        })
    }
}

impl std::fmt::Debug for TestHostController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHostController")
            .field("env_providers", &self.env_providers.len())
            .field("handlers", &self.handlers.len())
            .field("hang_timeout", &self.hang_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_extension::testing::RecordingConsumer;
    use testhost_extension::DataConsumer;
    use testhost_message::{TestNode, TestNodeState};
    use testhost_runtime::ipc::{
        ModuleInfoRequest, SessionSummaryRequest, TestHostExitRequest, TestResultsRequest,
    };
    use testhost_runtime::MessageBusBuilder;
    use testhost_types::{SessionUid, TestNodeUid};

    fn handler(consumer: &Arc<RecordingConsumer>) -> HostRequests {
        let producer = ControllerProducer::new();
        let bus = MessageBusBuilder::new()
            .producer(&producer)
            .consumer(Arc::clone(consumer) as Arc<dyn DataConsumer>)
            .build();
        HostRequests {
            bus,
            producer,
            monitor: Some(Arc::new(HangMonitor::new(Duration::from_secs(60)))),
            reported: Mutex::new(Reported::default()),
        }
    }

    #[tokio::test]
    async fn records_host_reports() {
        let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));
        let requests = handler(&consumer);
        let session_uid = SessionUid::new();

        let reply = requests
            .handle(IpcRequest::ModuleInfo(ModuleInfoRequest::new("m")))
            .await
            .expect("handshake");
        assert_eq!(reply, IpcReply::ModuleInfo(ModuleInfoReply::default()));

        requests
            .handle(IpcRequest::TestResults(TestResultsRequest {
                session_uid,
                nodes: vec![
                    TestNode::discovered(TestNodeUid::new("a"), "a").with_state(TestNodeState::Passed),
                    TestNode::discovered(TestNodeUid::new("b"), "b")
                        .with_state(TestNodeState::Cancelled),
                ],
            }))
            .await
            .expect("results");
        requests
            .handle(IpcRequest::SessionSummary(SessionSummaryRequest {
                session_uid,
                summary: RunSummary::new(),
            }))
            .await
            .expect("summary");
        requests
            .handle(IpcRequest::TestHostExit(TestHostExitRequest { exit_code: 2 }))
            .await
            .expect("exit");
        requests.bus.drain().await;

        let reported = requests.reported.lock();
        assert!(reported.connected);
        assert_eq!(reported.results, 2);
        assert!(reported.summary.is_some());
        assert_eq!(reported.exit_code, Some(2));
        assert_eq!(consumer.len(), 2);
    }

    #[tokio::test]
    async fn requests_keep_the_host_alive() {
        let consumer = Arc::new(RecordingConsumer::new("all", [MessageKind::TestNodeUpdate]));
        let requests = handler(&consumer);
        let monitor = requests.monitor.clone().expect("monitor");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let before = monitor.idle_for();
        requests
            .handle(IpcRequest::TestHostExit(TestHostExitRequest { exit_code: 0 }))
            .await
            .expect("exit");
        assert!(monitor.idle_for() < before);
    }

    #[tokio::test]
    async fn pipe_name_is_locked_into_the_environment() {
        let provider = PipeNameProvider {
            id: ExtensionId::builtin("controller-pipe"),
            pipe_name: "testhost-abc".into(),
        };
        let mut env = EnvironmentVariables::new();
        provider.update(&mut env).await.expect("update");
        assert_eq!(env.value(PIPE_NAME_VAR), Some("testhost-abc"));
        assert!(env.remove(PIPE_NAME_VAR).is_err());
    }
}
