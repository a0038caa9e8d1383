//! Test application.
//!
//! A [`TestApplication`] is produced by [`TestApplicationBuilder`] and
//! exposes a single entry point, [`run`](TestApplication::run), that
//! returns the process exit code.
//!
//! # Modes
//!
//! ```text
//! run(cancel)
//!   │
//!   ├── isolated ──────► TestHostController: launch child, supervise
//!   │
//!   ├── pipe name set ─► child: connect + handshake ─► session ─► report
//!   │
//!   └── otherwise ─────► session in this process
//!
//! session: banner ─► debugger wait ─► create ─► execute ─► telemetry ─► close
//! ```
//!
//! # Example
//!
//! ```ignore
//! use testhost_app::TestApplication;
//! use testhost_runtime::HostConfig;
//!
//! let mut builder = TestApplication::builder(HostConfig::default());
//! builder.add_test_framework(|| Arc::new(MyFramework::new()));
//! let app = builder.build().await?;
//! let exit_code = app.run(CancellationToken::new()).await;
//! ```

mod builder;
mod child;

pub use builder::TestApplicationBuilder;
pub use child::{ClientSlot, ResultForwarder};

use crate::controller::TestHostController;
use crate::AppError;
use child::ControllerLink;
use std::sync::Arc;
use std::time::Duration;
use testhost_extension::{
    async_trait, DataProducer, EnvironmentVariableProvider, Extension, ProcessLifetimeHandler,
    TestFilter, TestFramework,
};
use testhost_message::{Message, MessageKind, TelemetryEvent};
use testhost_runtime::execution::CoordinatorOptions;
use testhost_runtime::process::ProcessSpec;
use testhost_runtime::{
    CrashDumpHandler, HostConfig, MessageBus, ResolvedExtensions, SessionContext, SessionOutcome,
    SessionRequest, TestSession,
};
use testhost_types::{ErrorCode, ExitCode, ExtensionId, SessionUid};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Identity the application publishes telemetry under.
#[derive(Debug)]
pub struct ApplicationProducer {
    id: ExtensionId,
}

impl ApplicationProducer {
    pub const KINDS: [MessageKind; 1] = [MessageKind::Telemetry];

    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExtensionId::builtin("application"),
        }
    }
}

impl Default for ApplicationProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for ApplicationProducer {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Test application"
    }
}

impl DataProducer for ApplicationProducer {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        Self::KINDS.to_vec()
    }
}

/// A fully composed test host.
pub struct TestApplication {
    config: HostConfig,
    framework: Arc<dyn TestFramework>,
    extensions: ResolvedExtensions,
    bus: MessageBus,
    producer: ApplicationProducer,
    request: SessionRequest,
    filter: Option<TestFilter>,
    isolation: Option<ProcessSpec>,
    crash_dump: Option<Arc<CrashDumpHandler>>,
    client_slot: ClientSlot,
}

impl TestApplication {
    /// Creates a builder for the given configuration.
    #[must_use]
    pub fn builder(config: HostConfig) -> TestApplicationBuilder {
        TestApplicationBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    #[must_use]
    pub fn framework(&self) -> &Arc<dyn TestFramework> {
        &self.framework
    }

    /// Enabled extensions, fixed at build time.
    #[must_use]
    pub fn extensions(&self) -> &ResolvedExtensions {
        &self.extensions
    }

    #[must_use]
    pub fn request(&self) -> SessionRequest {
        self.request
    }

    /// Runs the application to completion and returns the exit code.
    ///
    /// Failures are logged and mapped to their exit code; nothing is
    /// returned as an error.
    pub async fn run(self, cancel: CancellationToken) -> ExitCode {
        let exit_code = match self.execute(&cancel).await {
            Ok(code) => code,
            Err(e) => {
                error!(code = e.code(), error = %e, "Test run failed");
                e.exit_code()
            }
        };
        self.bus.shutdown().await;
        info!(exit_code = %exit_code, "Test application finished");
        exit_code
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<ExitCode, AppError> {
        if let Some(spec) = &self.isolation {
            return self.run_isolated(spec, cancel).await;
        }

        self.print_banner();
        self.wait_for_debugger(cancel).await;

        match self.config.ipc.pipe_name.as_deref() {
            Some(pipe_name) => self.run_as_child(pipe_name, cancel).await,
            None => {
                let (_, outcome) = self.run_session(cancel).await?;
                Ok(outcome.exit_code())
            }
        }
    }

    fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            parallelism: self.config.execution.parallelism,
            default_timeout: self.config.execution.default_timeout(),
            report_path: self.config.report.destination(&self.config.results_dir()),
        }
    }

    async fn run_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(SessionUid, SessionOutcome), AppError> {
        let ctx = SessionContext {
            framework: Arc::clone(&self.framework),
            bus: self.bus.clone(),
            handlers: self.extensions.session_handlers.clone(),
            coordinator: self.coordinator_options(),
            filter: self.filter.clone(),
        };
        let mut session = TestSession::create(ctx, cancel).await?;
        let outcome = session.execute(self.request, cancel).await;
        if let Ok(outcome) = &outcome {
            self.publish_telemetry(outcome).await;
        }
        let closed = session.close(cancel).await;

        let outcome = outcome?;
        closed?;
        if let Some(summary) = outcome.summary() {
            info!(session = %session.uid(), summary = %summary, "Run finished");
        }
        Ok((session.uid(), outcome))
    }

    async fn run_as_child(
        &self,
        pipe_name: &str,
        cancel: &CancellationToken,
    ) -> Result<ExitCode, AppError> {
        let link = ControllerLink::open(pipe_name, &self.config, self.client_slot.clone(), cancel)
            .await?;

        let result = self.run_session(cancel).await;
        let exit_code = match &result {
            Ok((_, outcome)) => outcome.exit_code(),
            Err(e) => e.exit_code(),
        };
        if let Ok((session_uid, SessionOutcome::Ran(summary))) = &result {
            if let Err(e) = link.report_summary(*session_uid, summary, cancel).await {
                warn!(error = %e, "Failed to report the session summary");
            }
        }
        if let Err(e) = link.close(exit_code.code(), cancel).await {
            warn!(error = %e, "Failed to announce exit to the controller");
        }
        result.map(|_| exit_code)
    }

    async fn run_isolated(
        &self,
        spec: &ProcessSpec,
        cancel: &CancellationToken,
    ) -> Result<ExitCode, AppError> {
        let mut env_providers = self.extensions.env_providers.clone();
        let mut handlers = self.extensions.process_handlers.clone();
        if let Some(dumps) = &self.crash_dump {
            env_providers.push(Arc::clone(dumps) as Arc<dyn EnvironmentVariableProvider>);
            handlers.push(Arc::clone(dumps) as Arc<dyn ProcessLifetimeHandler>);
        }

        let controller =
            TestHostController::new(&self.config, env_providers, handlers, self.bus.clone());
        let outcome = controller.run(spec, cancel).await?;
        if let Some(summary) = &outcome.summary {
            info!(summary = %summary, "Isolated run finished");
        }
        Ok(outcome.exit_code)
    }

    /// Banner text: the framework's when it owns the banner.
    #[must_use]
    pub fn banner(&self) -> String {
        self.framework
            .capabilities()
            .banner_message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("testhost v{}", env!("CARGO_PKG_VERSION")))
    }

    fn print_banner(&self) {
        if self.config.ui.no_banner {
            return;
        }
        println!("{}", self.banner());
    }

    async fn wait_for_debugger(&self, cancel: &CancellationToken) {
        if !self.config.debugger.launch_on_start {
            return;
        }
        let pid = std::process::id();
        let wait = Duration::from_millis(self.config.debugger.wait_ms);
        info!(pid, wait_ms = self.config.debugger.wait_ms, "Waiting for a debugger to attach");
        eprintln!("Waiting for debugger to attach to process {}...", pid);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => {}
        }
    }

    async fn publish_telemetry(&self, outcome: &SessionOutcome) {
        if self.config.telemetry.opt_out {
            return;
        }
        let mut event = TelemetryEvent::new("run/completed")
            .with("request", self.request)
            .with("framework", self.framework.uid())
            .with("exit_code", outcome.exit_code().code());
        if let Some(summary) = outcome.summary() {
            event = event
                .with("tests", summary.total)
                .with("failed", summary.failures());
        }
        if let Err(e) = self.bus.publish(&self.producer, Message::Telemetry(event)).await {
            warn!(error = %e, "Failed to publish telemetry");
        }
    }
}

impl std::fmt::Debug for TestApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestApplication")
            .field("framework", self.framework.uid())
            .field("request", &self.request)
            .field("isolated", &self.isolation.is_some())
            .finish()
    }
}
