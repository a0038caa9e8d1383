//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use testhost_runtime::config::HostConfig;
///
/// let config = HostConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.execution.parallelism, None);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Enable debug mode (debug-level logging, diagnostics).
    pub debug: bool,

    /// Directory for reports, crash dumps and logs.
    pub results_directory: Option<PathBuf>,

    pub execution: ExecutionConfig,
    pub report: ReportConfig,
    pub ipc: IpcConfig,
    pub crash_dump: CrashDumpConfig,
    pub hang: HangConfig,
    pub telemetry: TelemetryConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
    pub debugger: DebuggerConfig,
}

impl HostConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Resolved results directory (`./TestResults` when unset).
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.results_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("TestResults"))
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default. This enables layered configuration.
    pub fn merge(&mut self, other: &Self) {
        if other.debug {
            self.debug = true;
        }
        if other.results_directory.is_some() {
            self.results_directory = other.results_directory.clone();
        }

        self.execution.merge(&other.execution);
        self.report.merge(&other.report);
        self.ipc.merge(&other.ipc);
        self.crash_dump.merge(&other.crash_dump);
        self.hang.merge(&other.hang);
        self.telemetry.merge(&other.telemetry);
        self.ui.merge(&other.ui);
        self.logging.merge(&other.logging);
        self.debugger.merge(&other.debugger);
    }
}

/// Execution coordinator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Degree of parallelism. `None` is effectively unbounded.
    pub parallelism: Option<usize>,

    /// Deadline applied to tests without their own timeout.
    pub default_timeout_ms: Option<u64>,
}

impl ExecutionConfig {
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    fn merge(&mut self, other: &Self) {
        if other.parallelism.is_some() {
            self.parallelism = other.parallelism;
        }
        if other.default_timeout_ms.is_some() {
            self.default_timeout_ms = other.default_timeout_ms;
        }
    }
}

/// Severity of the failure lines printed by reporters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSeverity {
    #[default]
    Error,
    Warning,
}

impl FromStr for ReportSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            other => Err(format!("expected 'error' or 'warning', got '{}'", other)),
        }
    }
}

impl std::fmt::Display for ReportSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Plain-text run report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Write the run report.
    pub enabled: bool,

    /// File name inside the results directory.
    pub file_name: Option<String>,

    pub severity: ReportSeverity,
}

impl ReportConfig {
    /// Default report file name.
    pub const DEFAULT_FILE_NAME: &'static str = "testhost-report.txt";

    /// Report destination, when enabled.
    #[must_use]
    pub fn destination(&self, results_dir: &std::path::Path) -> Option<PathBuf> {
        self.enabled.then(|| {
            results_dir.join(
                self.file_name
                    .as_deref()
                    .unwrap_or(Self::DEFAULT_FILE_NAME),
            )
        })
    }

    fn merge(&mut self, other: &Self) {
        if other.enabled {
            self.enabled = true;
        }
        if other.file_name.is_some() {
            self.file_name = other.file_name.clone();
        }
        if other.severity != ReportSeverity::default() {
            self.severity = other.severity;
        }
    }
}

/// IPC channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IpcConfig {
    /// Channel name. Set only when running as a controlled child.
    pub pipe_name: Option<String>,

    /// Connect + handshake deadline.
    pub connect_timeout_ms: u64,

    /// Deadline for a single request/reply.
    pub request_timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            pipe_name: None,
            connect_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl IpcConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.pipe_name.is_some() {
            self.pipe_name = other.pipe_name.clone();
        }
        if other.connect_timeout_ms != default.connect_timeout_ms {
            self.connect_timeout_ms = other.connect_timeout_ms;
        }
        if other.request_timeout_ms != default.request_timeout_ms {
            self.request_timeout_ms = other.request_timeout_ms;
        }
    }
}

/// Kind of dump the runtime writes on a crash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpType {
    Mini,
    Heap,
    Triage,
    #[default]
    Full,
}

impl DumpType {
    /// Value of the `DbgMiniDumpType` variable.
    #[must_use]
    pub fn env_value(self) -> &'static str {
        match self {
            Self::Mini => "1",
            Self::Heap => "2",
            Self::Triage => "3",
            Self::Full => "4",
        }
    }
}

impl FromStr for DumpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mini" => Ok(Self::Mini),
            "heap" => Ok(Self::Heap),
            "triage" => Ok(Self::Triage),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "expected one of mini, heap, triage, full; got '{}'",
                other
            )),
        }
    }
}

/// Crash-dump collection for a launched test host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrashDumpConfig {
    pub enabled: bool,
    pub dump_type: DumpType,

    /// File name pattern; `%p` is replaced with the process id.
    pub file_pattern: String,

    /// Prefixes under which the dump variables are injected.
    pub env_prefixes: Vec<String>,
}

impl Default for CrashDumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dump_type: DumpType::Full,
            file_pattern: "testhost_%p_crash.dmp".into(),
            env_prefixes: vec!["DOTNET_".into(), "COMPlus_".into()],
        }
    }
}

impl CrashDumpConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.enabled {
            self.enabled = true;
        }
        if other.dump_type != default.dump_type {
            self.dump_type = other.dump_type;
        }
        if other.file_pattern != default.file_pattern {
            self.file_pattern = other.file_pattern.clone();
        }
        if other.env_prefixes != default.env_prefixes {
            self.env_prefixes = other.env_prefixes.clone();
        }
    }
}

/// Hang detection for a launched test host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HangConfig {
    pub enabled: bool,

    /// Silence on the IPC channel longer than this is a hang.
    pub timeout_ms: u64,
}

impl Default for HangConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 30 * 60 * 1000,
        }
    }
}

impl HangConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn merge(&mut self, other: &Self) {
        if other.enabled {
            self.enabled = true;
        }
        if other.timeout_ms != Self::default().timeout_ms {
            self.timeout_ms = other.timeout_ms;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub opt_out: bool,
}

impl TelemetryConfig {
    fn merge(&mut self, other: &Self) {
        if other.opt_out {
            self.opt_out = true;
        }
    }
}

/// UI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Suppress the startup banner.
    pub no_banner: bool,

    /// Verbose output.
    pub verbose: bool,
}

impl UiConfig {
    fn merge(&mut self, other: &Self) {
        if other.no_banner {
            self.no_banner = true;
        }
        if other.verbose {
            self.verbose = true;
        }
    }
}

/// Diagnostic log file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write `testhost.log`.
    pub file: bool,

    /// Filter directive for the file layer.
    pub file_level: String,

    /// Log directory; the results directory when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            file_level: "debug".into(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.file {
            self.file = true;
        }
        if other.file_level != Self::default().file_level {
            self.file_level = other.file_level.clone();
        }
        if other.directory.is_some() {
            self.directory = other.directory.clone();
        }
    }
}

/// Debugger attach support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Log the PID and pause at startup.
    pub launch_on_start: bool,

    /// How long to pause.
    pub wait_ms: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            launch_on_start: false,
            wait_ms: 10_000,
        }
    }
}

impl DebuggerConfig {
    fn merge(&mut self, other: &Self) {
        if other.launch_on_start {
            self.launch_on_start = true;
        }
        if other.wait_ms != Self::default().wait_ms {
            self.wait_ms = other.wait_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HostConfig::default();
        assert_eq!(config.ipc.connect_timeout_ms, 30_000);
        assert_eq!(config.crash_dump.env_prefixes, vec!["DOTNET_", "COMPlus_"]);
        assert_eq!(config.crash_dump.file_pattern, "testhost_%p_crash.dmp");
        assert!(!config.report.enabled);
        assert_eq!(config.results_dir(), PathBuf::from("TestResults"));
    }

    #[test]
    fn parse_partial_toml() {
        let config = HostConfig::from_toml(
            r#"
[execution]
parallelism = 4

[report]
enabled = true
severity = "warning"

[crash_dump]
dump_type = "mini"
"#,
        )
        .expect("parse");

        assert_eq!(config.execution.parallelism, Some(4));
        assert!(config.report.enabled);
        assert_eq!(config.report.severity, ReportSeverity::Warning);
        assert_eq!(config.crash_dump.dump_type, DumpType::Mini);
        assert_eq!(config.ipc, IpcConfig::default());
    }

    #[test]
    fn merge_overrides_non_defaults_only() {
        let mut base = HostConfig::default();
        base.execution.parallelism = Some(2);
        base.ipc.request_timeout_ms = 5_000;

        let mut overlay = HostConfig::default();
        overlay.execution.default_timeout_ms = Some(100);
        overlay.ui.no_banner = true;

        base.merge(&overlay);

        assert_eq!(base.execution.parallelism, Some(2));
        assert_eq!(base.execution.default_timeout_ms, Some(100));
        assert_eq!(base.ipc.request_timeout_ms, 5_000);
        assert!(base.ui.no_banner);
    }

    #[test]
    fn report_destination() {
        let mut report = ReportConfig::default();
        let dir = PathBuf::from("out");
        assert_eq!(report.destination(&dir), None);

        report.enabled = true;
        assert_eq!(
            report.destination(&dir),
            Some(dir.join(ReportConfig::DEFAULT_FILE_NAME))
        );

        report.file_name = Some("run.txt".into());
        assert_eq!(report.destination(&dir), Some(dir.join("run.txt")));
    }

    #[test]
    fn enum_parsing() {
        assert_eq!("Warning".parse::<ReportSeverity>(), Ok(ReportSeverity::Warning));
        assert!("info".parse::<ReportSeverity>().is_err());
        assert_eq!("triage".parse::<DumpType>(), Ok(DumpType::Triage));
        assert_eq!(DumpType::Heap.env_value(), "2");
        assert!("huge".parse::<DumpType>().is_err());
    }
}
