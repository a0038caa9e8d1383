//! Test host process launcher.
//!
//! ```text
//! inherit env ─► providers.update ─► providers.validate
//!      ─► handlers.before_start ─► spawn ─► handlers.on_started(pid)
//!                                              │
//!                     wait / kill ◄────────────┘
//!                         │
//!                 handlers.on_exited(record)
//! ```

use super::ProcessError;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::SystemTime;
use testhost_extension::{
    EnvironmentVariableProvider, EnvironmentVariables, MessagePublisher, ProcessLifetimeHandler,
    ProcessLifetimeRecord,
};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Inherit the parent's stdout/stderr instead of discarding them.
    pub inherit_stdio: bool,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            inherit_stdio: true,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.inherit_stdio = false;
        self
    }
}

/// Launches test hosts with provider-built environments.
#[derive(Default, Clone)]
pub struct ProcessLauncher {
    env_providers: Vec<Arc<dyn EnvironmentVariableProvider>>,
    handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(
        env_providers: Vec<Arc<dyn EnvironmentVariableProvider>>,
        handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
    ) -> Self {
        Self {
            env_providers,
            handlers,
        }
    }

    /// Builds the child environment from the parent's.
    ///
    /// # Errors
    ///
    /// [`ProcessError::Environment`] or
    /// [`ProcessError::EnvironmentValidation`].
    pub async fn prepare_environment(
        &self,
        mut env: EnvironmentVariables,
    ) -> Result<EnvironmentVariables, ProcessError> {
        for provider in &self.env_providers {
            provider
                .update(&mut env)
                .await
                .map_err(|source| ProcessError::Environment {
                    provider: provider.uid().clone(),
                    source,
                })?;
        }
        for provider in &self.env_providers {
            provider
                .validate(&env)
                .await
                .map_err(|source| ProcessError::EnvironmentValidation {
                    provider: provider.uid().clone(),
                    source,
                })?;
        }
        Ok(env)
    }

    /// Starts `spec` and notifies lifetime handlers.
    ///
    /// # Errors
    ///
    /// Environment, handler or spawn failures.
    pub async fn launch(&self, spec: &ProcessSpec) -> Result<TestHostProcess, ProcessError> {
        let env = self.prepare_environment(EnvironmentVariables::inherit()).await?;

        for handler in &self.handlers {
            handler
                .before_start()
                .await
                .map_err(|source| ProcessError::Handler {
                    handler: handler.uid().clone(),
                    source,
                })?;
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env_clear()
            .envs(env.pairs())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !spec.inherit_stdio {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let spawn_error = |message: String| ProcessError::Spawn {
            program: spec.program.display().to_string(),
            message,
        };
        let child = command.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_error("process exited before its id was read".to_string()))?;
        let started_at = SystemTime::now();
        info!(pid, program = %spec.program.display(), "Test host started");

        for handler in &self.handlers {
            if let Err(e) = handler.on_started(pid).await {
                warn!(pid, handler = %handler.uid(), error = %e, "Process start hook failed");
            }
        }

        Ok(TestHostProcess {
            child,
            pid,
            started_at,
            handlers: self.handlers.clone(),
        })
    }
}

/// A running test host.
pub struct TestHostProcess {
    child: Child,
    pid: u32,
    started_at: SystemTime,
    handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
}

impl TestHostProcess {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits for the process to terminate. Returns the raw exit code,
    /// `None` when killed by a signal.
    ///
    /// # Errors
    ///
    /// [`ProcessError::Wait`].
    pub async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ProcessError::Wait(e.to_string()))?;
        debug!(pid = self.pid, status = %status, "Test host terminated");
        Ok(status.code())
    }

    /// Kills the process and reaps it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(pid = self.pid, error = %e, "Failed to kill test host");
        }
    }

    /// Notifies every lifetime handler of the exit and returns the record.
    ///
    /// Handler failures are logged; they do not change the record.
    pub async fn finish(
        self,
        exit_code: Option<i32>,
        graceful: bool,
        publisher: &dyn MessagePublisher,
    ) -> ProcessLifetimeRecord {
        let record = ProcessLifetimeRecord {
            pid: self.pid,
            started_at: self.started_at,
            exit_code,
            graceful,
        };
        if record.is_ungraceful() {
            warn!(pid = record.pid, exit_code = ?exit_code, "Test host exited ungracefully");
        }
        for handler in &self.handlers {
            if let Err(e) = handler.on_exited(&record, publisher).await {
                warn!(pid = record.pid, handler = %handler.uid(), error = %e, "Process exit hook failed");
            }
        }
        record
    }
}

impl std::fmt::Debug for TestHostProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHostProcess")
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
