//! Command-line configuration overrides.
//!
//! Implements [`ConfigResolver`] for flags given on the command line.

use std::path::PathBuf;
use testhost_runtime::config::{DumpType, ReportSeverity};
use testhost_runtime::{ConfigResolver, HostConfig};

/// Command-line configuration overrides.
///
/// Applied as the highest priority layer after file/env config loading.
///
/// # Example
///
/// ```ignore
/// use testhost_app::CliOverrides;
/// use testhost_runtime::{ConfigLoader, ConfigResolver};
///
/// let mut config = ConfigLoader::new().load()?;
///
/// let cli = CliOverrides::new()
///     .parallelism(4)
///     .report(true);
///
/// cli.apply(&mut config);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    debug: Option<bool>,
    verbose: Option<bool>,
    no_banner: Option<bool>,
    parallelism: Option<usize>,
    timeout_ms: Option<u64>,
    results_directory: Option<PathBuf>,
    report: Option<bool>,
    report_file_name: Option<String>,
    report_severity: Option<ReportSeverity>,
    diagnostic: Option<bool>,
    crash_dump: Option<bool>,
    dump_type: Option<DumpType>,
    hang_timeout_ms: Option<u64>,
    pipe_name: Option<String>,
}

impl CliOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn debug(mut self, value: bool) -> Self {
        self.debug = Some(value);
        self
    }

    #[must_use]
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = Some(value);
        self
    }

    #[must_use]
    pub fn no_banner(mut self, value: bool) -> Self {
        self.no_banner = Some(value);
        self
    }

    /// Maximum number of tests in flight.
    #[must_use]
    pub fn parallelism(mut self, value: usize) -> Self {
        self.parallelism = Some(value);
        self
    }

    /// Per-test timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, value: u64) -> Self {
        self.timeout_ms = Some(value);
        self
    }

    #[must_use]
    pub fn results_directory(mut self, path: PathBuf) -> Self {
        self.results_directory = Some(path);
        self
    }

    /// Enables or disables the run report.
    #[must_use]
    pub fn report(mut self, value: bool) -> Self {
        self.report = Some(value);
        self
    }

    /// Report file name; implies `report(true)`.
    #[must_use]
    pub fn report_file_name(mut self, name: impl Into<String>) -> Self {
        self.report_file_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn report_severity(mut self, value: ReportSeverity) -> Self {
        self.report_severity = Some(value);
        self
    }

    /// Writes the diagnostic log file.
    #[must_use]
    pub fn diagnostic(mut self, value: bool) -> Self {
        self.diagnostic = Some(value);
        self
    }

    #[must_use]
    pub fn crash_dump(mut self, value: bool) -> Self {
        self.crash_dump = Some(value);
        self
    }

    /// Dump type; implies `crash_dump(true)`.
    #[must_use]
    pub fn dump_type(mut self, value: DumpType) -> Self {
        self.dump_type = Some(value);
        self
    }

    /// Hang timeout in milliseconds; enables hang detection.
    #[must_use]
    pub fn hang_timeout_ms(mut self, value: u64) -> Self {
        self.hang_timeout_ms = Some(value);
        self
    }

    /// IPC channel of the controlling process.
    #[must_use]
    pub fn pipe_name(mut self, name: impl Into<String>) -> Self {
        self.pipe_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn parallelism_opt(mut self, value: Option<usize>) -> Self {
        if let Some(v) = value {
            self.parallelism = Some(v);
        }
        self
    }

    #[must_use]
    pub fn timeout_ms_opt(mut self, value: Option<u64>) -> Self {
        if let Some(v) = value {
            self.timeout_ms = Some(v);
        }
        self
    }

    #[must_use]
    pub fn results_directory_opt(mut self, path: Option<PathBuf>) -> Self {
        if let Some(p) = path {
            self.results_directory = Some(p);
        }
        self
    }

    #[must_use]
    pub fn report_file_name_opt(mut self, name: Option<String>) -> Self {
        if let Some(n) = name {
            self.report_file_name = Some(n);
        }
        self
    }

    #[must_use]
    pub fn report_severity_opt(mut self, value: Option<ReportSeverity>) -> Self {
        if let Some(v) = value {
            self.report_severity = Some(v);
        }
        self
    }

    #[must_use]
    pub fn dump_type_opt(mut self, value: Option<DumpType>) -> Self {
        if let Some(v) = value {
            self.dump_type = Some(v);
        }
        self
    }

    #[must_use]
    pub fn hang_timeout_ms_opt(mut self, value: Option<u64>) -> Self {
        if let Some(v) = value {
            self.hang_timeout_ms = Some(v);
        }
        self
    }

    #[must_use]
    pub fn pipe_name_opt(mut self, name: Option<String>) -> Self {
        if let Some(n) = name {
            self.pipe_name = Some(n);
        }
        self
    }
}

impl ConfigResolver for CliOverrides {
    fn apply(&self, config: &mut HostConfig) {
        if let Some(d) = self.debug {
            config.debug = d;
        }
        if let Some(v) = self.verbose {
            config.ui.verbose = v;
        }
        if let Some(b) = self.no_banner {
            config.ui.no_banner = b;
        }
        if let Some(p) = self.parallelism {
            config.execution.parallelism = Some(p);
        }
        if let Some(t) = self.timeout_ms {
            config.execution.default_timeout_ms = Some(t);
        }
        if let Some(ref dir) = self.results_directory {
            config.results_directory = Some(dir.clone());
        }
        if let Some(r) = self.report {
            config.report.enabled = r;
        }
        if let Some(ref name) = self.report_file_name {
            config.report.enabled = true;
            config.report.file_name = Some(name.clone());
        }
        if let Some(s) = self.report_severity {
            config.report.severity = s;
        }
        if let Some(d) = self.diagnostic {
            config.logging.file = d;
        }
        if let Some(c) = self.crash_dump {
            config.crash_dump.enabled = c;
        }
        if let Some(t) = self.dump_type {
            config.crash_dump.enabled = true;
            config.crash_dump.dump_type = t;
        }
        if let Some(ms) = self.hang_timeout_ms {
            config.hang.enabled = true;
            config.hang.timeout_ms = ms;
        }
        if let Some(ref name) = self.pipe_name {
            config.ipc.pipe_name = Some(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_nothing() {
        let mut config = HostConfig::default();
        let original = config.clone();

        CliOverrides::new().apply(&mut config);

        assert_eq!(config, original);
    }

    #[test]
    fn execution_overrides() {
        let mut config = HostConfig::default();

        CliOverrides::new()
            .parallelism(3)
            .timeout_ms(250)
            .apply(&mut config);

        assert_eq!(config.execution.parallelism, Some(3));
        assert_eq!(config.execution.default_timeout_ms, Some(250));
    }

    #[test]
    fn report_file_name_enables_report() {
        let mut config = HostConfig::default();
        assert!(!config.report.enabled);

        CliOverrides::new()
            .report_file_name("out.txt")
            .apply(&mut config);

        assert!(config.report.enabled);
        assert_eq!(config.report.file_name.as_deref(), Some("out.txt"));
    }

    #[test]
    fn severity_and_diagnostic_overrides() {
        let mut config = HostConfig::default();

        CliOverrides::new()
            .report_severity(ReportSeverity::Warning)
            .diagnostic(true)
            .apply(&mut config);

        assert_eq!(config.report.severity, ReportSeverity::Warning);
        assert!(config.logging.file);
    }

    #[test]
    fn dump_type_enables_crash_dump() {
        let mut config = HostConfig::default();

        CliOverrides::new()
            .dump_type(DumpType::Mini)
            .apply(&mut config);

        assert!(config.crash_dump.enabled);
        assert_eq!(config.crash_dump.dump_type, DumpType::Mini);
    }

    #[test]
    fn hang_timeout_enables_hang_detection() {
        let mut config = HostConfig::default();

        CliOverrides::new().hang_timeout_ms(900).apply(&mut config);

        assert!(config.hang.enabled);
        assert_eq!(config.hang.timeout_ms, 900);
    }

    #[test]
    fn chained_overrides() {
        let mut config = HostConfig::default();

        CliOverrides::new()
            .verbose(true)
            .debug(true)
            .no_banner(true)
            .results_directory(PathBuf::from("/tmp/results"))
            .pipe_name("testhost-abc")
            .apply(&mut config);

        assert!(config.ui.verbose);
        assert!(config.debug);
        assert!(config.ui.no_banner);
        assert_eq!(config.results_directory, Some(PathBuf::from("/tmp/results")));
        assert_eq!(config.ipc.pipe_name.as_deref(), Some("testhost-abc"));
    }

    #[test]
    fn opt_methods_skip_none() {
        let mut config = HostConfig::default();
        let original = config.clone();

        CliOverrides::new()
            .parallelism_opt(None)
            .timeout_ms_opt(None)
            .results_directory_opt(None)
            .report_file_name_opt(None)
            .report_severity_opt(None)
            .dump_type_opt(None)
            .hang_timeout_ms_opt(None)
            .pipe_name_opt(None)
            .apply(&mut config);

        assert_eq!(config, original);
    }
}
