//! Console reporter.
//!
//! One instance serves four roles, registered through a
//! `CompositeExtensionFactory`:
//!
//! | Role | Use |
//! |------|-----|
//! | `DataConsumer` | prints test results and artifacts as they arrive |
//! | `TestSessionLifetimeHandler` | times the session |
//! | `ProcessLifetimeHandler` | reports an isolated host that died |
//! | `CommandLineOptionsProvider` | owns `--option console-output=<mode>` |
//!
//! The run summary is printed by the binary after the application
//! finished, once the bus was drained.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Instant;
use testhost_extension::{
    async_trait, ArgumentArity, CancellationToken, CommandLineOption, CommandLineOptionsProvider,
    DataConsumer, Extension, ExtensionError, MessagePublisher, ProcessLifetimeHandler,
    ProcessLifetimeRecord, TestSessionLifetimeHandler,
};
use testhost_message::{Message, MessageKind, TestNode, TestNodeState};
use testhost_runtime::config::ReportSeverity;
use testhost_types::{ExitCode, ExtensionId, SessionUid};

/// Name of the option selecting the output mode.
pub const OUTPUT_OPTION: &str = "console-output";

/// How much the reporter prints per test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Failures and artifacts only.
    #[default]
    Normal,
    /// Every terminal result.
    Detailed,
    /// Nothing but the summary.
    Quiet,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "detailed" => Ok(Self::Detailed),
            "quiet" => Ok(Self::Quiet),
            other => Err(format!(
                "expected one of normal, detailed, quiet; got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    discovered: usize,
    /// Terminal results by state label.
    outcomes: BTreeMap<&'static str, usize>,
    started: Option<Instant>,
    elapsed_ms: Option<u128>,
}

impl Tally {
    fn count(&self, label: &str) -> usize {
        self.outcomes.get(label).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.outcomes.values().sum()
    }
}

/// Prints results to stdout.
#[derive(Debug)]
pub struct ConsoleReporter {
    id: ExtensionId,
    mode: OutputMode,
    severity: ReportSeverity,
    /// Counts without printing; used when a controller prints instead.
    silent: bool,
    tally: Mutex<Tally>,
}

impl ConsoleReporter {
    #[must_use]
    pub fn new(mode: OutputMode, severity: ReportSeverity) -> Self {
        Self {
            id: ExtensionId::new("reporter", "console"),
            mode,
            severity,
            silent: false,
            tally: Mutex::new(Tally::default()),
        }
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn emit(&self, text: &str) {
        if !self.silent {
            println!("{}", text);
        }
    }

    fn describe(&self, node: &TestNode) -> Option<String> {
        let state = &node.state;
        let show = match self.mode {
            OutputMode::Quiet => false,
            OutputMode::Detailed => true,
            OutputMode::Normal => state.is_failure() || matches!(state, TestNodeState::Cancelled),
        };
        if !show {
            return None;
        }

        let mut line = String::new();
        if state.is_failure() {
            let _ = write!(line, "{}: ", self.severity);
        }
        let _ = write!(line, "{} {}", state.label(), node.uid);
        if node.display_name != node.uid.as_str() {
            let _ = write!(line, " [{}]", node.display_name);
        }
        if let Some(ms) = node.duration_ms {
            let _ = write!(line, " ({} ms)", ms);
        }
        if let Some(message) = state.message() {
            let _ = write!(line, "\n    {}", message);
        }
        Some(line)
    }

    /// Summary of everything observed so far.
    #[must_use]
    pub fn summary(&self, exit_code: ExitCode) -> String {
        let tally = self.tally.lock();
        if tally.total() == 0 && tally.discovered > 0 {
            return format!("Discovered {} test(s).", tally.discovered);
        }

        let failed = tally.count("failed") + tally.count("error") + tally.count("timeout");
        let verdict = if exit_code.is_success() { "Passed!" } else { "Failed!" };
        let mut line = format!(
            "{} - total: {}, passed: {}, failed: {}, skipped: {}, cancelled: {}",
            verdict,
            tally.total(),
            tally.count("passed"),
            failed,
            tally.count("skipped"),
            tally.count("cancelled"),
        );
        if let Some(ms) = tally.elapsed_ms {
            let _ = write!(line, ", duration: {} ms", ms);
        }
        let _ = write!(line, " (exit code {})", exit_code.code());
        line
    }

    /// Prints [`summary`](Self::summary) unless silent.
    pub fn print_summary(&self, exit_code: ExitCode) {
        let summary = self.summary(exit_code);
        self.emit(&summary);
    }
}

#[async_trait]
impl Extension for ConsoleReporter {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Console reporter"
    }

    fn description(&self) -> &str {
        "Prints test results to standard output"
    }
}

#[async_trait]
impl DataConsumer for ConsoleReporter {
    fn consumed_kinds(&self) -> Vec<MessageKind> {
        vec![
            MessageKind::TestNodeUpdate,
            MessageKind::SessionArtifact,
            MessageKind::FileArtifact,
        ]
    }

    async fn consume(&self, _producer: &ExtensionId, message: &Message) -> Result<(), ExtensionError> {
        match message {
            Message::TestNodeUpdate(update) => {
                let node = &update.node;
                if node.state.is_terminal() {
                    *self
                        .tally
                        .lock()
                        .outcomes
                        .entry(node.state.label())
                        .or_default() += 1;
                    if let Some(line) = self.describe(node) {
                        self.emit(&line);
                    }
                } else {
                    self.tally.lock().discovered += 1;
                    if self.mode != OutputMode::Quiet {
                        self.emit(&format!("  {}", node.uid));
                    }
                }
            }
            Message::SessionArtifact(artifact) => {
                self.emit(&format!(
                    "Report: {} ({})",
                    artifact.display_name,
                    artifact.path.display()
                ));
            }
            Message::FileArtifact(artifact) => {
                self.emit(&format!(
                    "Artifact: {} ({})",
                    artifact.display_name,
                    artifact.path.display()
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl TestSessionLifetimeHandler for ConsoleReporter {
    async fn on_session_starting(
        &self,
        _session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        self.tally.lock().started = Some(Instant::now());
        Ok(())
    }

    async fn on_session_finishing(
        &self,
        _session_uid: SessionUid,
        _cancel: &CancellationToken,
    ) -> Result<(), ExtensionError> {
        let mut tally = self.tally.lock();
        tally.elapsed_ms = tally.started.map(|t| t.elapsed().as_millis());
        Ok(())
    }
}

#[async_trait]
impl ProcessLifetimeHandler for ConsoleReporter {
    async fn on_exited(
        &self,
        record: &ProcessLifetimeRecord,
        _publisher: &dyn MessagePublisher,
    ) -> Result<(), ExtensionError> {
        if record.is_ungraceful() {
            let code = record
                .exit_code
                .map_or_else(|| "none".to_string(), |c| c.to_string());
            self.emit(&format!(
                "Test host process {} exited ungracefully (exit code: {})",
                record.pid, code
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandLineOptionsProvider for ConsoleReporter {
    fn options(&self) -> Vec<CommandLineOption> {
        vec![CommandLineOption::new(
            OUTPUT_OPTION,
            "Console output: normal, detailed or quiet",
            ArgumentArity::ExactlyOne,
        )]
    }

    async fn validate_option(
        &self,
        option: &CommandLineOption,
        values: &[String],
    ) -> Result<(), ExtensionError> {
        for value in values {
            OutputMode::from_str(value).map_err(|reason| ExtensionError::InvalidOption {
                option: option.name.clone(),
                reason,
            })?;
        }
        Ok(())
    }
}
