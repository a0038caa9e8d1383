//! testhost - runs test suites on the testhost platform.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`TESTHOST_*`)
//! 3. Project config (`.testhost/config.toml` under `--project`)
//! 4. Global config (`~/.testhost/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `TESTHOST_PARALLELISM`: Maximum tests in flight
//! - `TESTHOST_RESULTS_DIRECTORY`: Where reports, dumps and logs go
//! - `TESTHOST_TELEMETRY_OPTOUT` / `TESTHOST_CLI_TELEMETRY_OPTOUT`: Disable telemetry
//! - `TESTHOST_NOBANNER` / `TESTHOST_NOLOGO`: Suppress the banner
//! - `TESTHOST_LAUNCH_ATTACH_DEBUGGER`: Print the PID and wait for a debugger
//! - `TESTHOST_PIPE_NAME`: Set by a controller for the child it launched
//!
//! # Exit Codes
//!
//! The process exits with the code of the run (`0` success, `2` failed
//! tests, `8` no tests, ...). See [`ExitCode`].

mod console;
mod manifest;
mod tracing_writer;

use anyhow::{Context, Result};
use clap::Parser;
use console::{ConsoleReporter, OutputMode, OUTPUT_OPTION};
use manifest::{Manifest, ManifestFramework};
use std::path::PathBuf;
use std::sync::Arc;
use testhost_app::{
    CancellationToken, CliOverrides, CompositeExtensionFactory, ConfigLoader, ConfigResolver,
    ErrorCode, ExitCode, HostConfig, ParsedOptions, ProcessSpec, SessionRequest, TestApplication,
    TestFilter,
};
use testhost_runtime::config::{DumpType, ReportSeverity};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tracing_writer::LogFile;

/// testhost - extensible test host
#[derive(Parser, Debug)]
#[command(name = "testhost")]
#[command(version, about, long_about = None)]
struct Args {
    /// Test manifest to run
    #[arg(short, long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// List tests instead of running them
    #[arg(long)]
    list_tests: bool,

    /// Only run tests whose uid or name contains PATTERN
    #[arg(long, value_name = "PATTERN")]
    filter: Option<String>,

    /// Maximum number of tests running at once
    #[arg(long, value_name = "N")]
    parallelism: Option<usize>,

    /// Default per-test timeout in milliseconds
    #[arg(long, value_name = "MS")]
    test_timeout: Option<u64>,

    /// Write the plain-text run report
    #[arg(long)]
    report: bool,

    /// Report file name inside the results directory (implies --report)
    #[arg(long, value_name = "NAME")]
    report_filename: Option<String>,

    /// Severity used for failed tests in reports
    #[arg(long, value_name = "error|warning")]
    report_severity: Option<ReportSeverity>,

    /// Directory for reports, dumps and diagnostic logs
    #[arg(long, value_name = "DIR")]
    results_directory: Option<PathBuf>,

    /// Run the tests in a child test host supervised by this process
    #[arg(long)]
    isolate: bool,

    /// Collect a crash dump if the isolated test host crashes
    #[arg(long)]
    crashdump: bool,

    /// Crash dump type (implies --crashdump)
    #[arg(long, value_name = "mini|heap|triage|full")]
    crashdump_type: Option<DumpType>,

    /// Kill the isolated test host after SECS without activity
    #[arg(long, value_name = "SECS")]
    hangdump_timeout: Option<u64>,

    /// Extension option, NAME or NAME=VALUE (repeatable)
    #[arg(long = "option", value_name = "NAME[=VALUE]")]
    options: Vec<String>,

    /// Project directory holding `.testhost/config.toml`
    #[arg(short = 'C', long, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Write a diagnostic log file
    #[arg(long)]
    diagnostic: bool,

    /// Suppress the banner
    #[arg(long)]
    no_banner: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// IPC channel of the controlling process
    #[arg(long, hide = true)]
    pipe_name: Option<String>,
}

impl Args {
    /// Flags that override the loaded configuration.
    fn overrides(&self) -> CliOverrides {
        let mut cli = CliOverrides::new()
            .parallelism_opt(self.parallelism)
            .timeout_ms_opt(self.test_timeout)
            .results_directory_opt(self.results_directory.clone())
            .report_file_name_opt(self.report_filename.clone())
            .report_severity_opt(self.report_severity)
            .dump_type_opt(self.crashdump_type)
            .hang_timeout_ms_opt(self.hangdump_timeout.map(|s| s.saturating_mul(1000)))
            .pipe_name_opt(self.pipe_name.clone());
        if self.report {
            cli = cli.report(true);
        }
        if self.crashdump {
            cli = cli.crash_dump(true);
        }
        if self.diagnostic {
            cli = cli.diagnostic(true);
        }
        if self.no_banner {
            cli = cli.no_banner(true);
        }
        if self.debug {
            cli = cli.debug(true);
        }
        if self.verbose {
            cli = cli.verbose(true);
        }
        cli
    }

    fn request(&self) -> SessionRequest {
        if self.list_tests {
            SessionRequest::Discover
        } else {
            SessionRequest::Run
        }
    }
}

/// Launch spec for the isolated child: this binary with the same arguments,
/// minus `--isolate`.
fn child_spec(raw_args: impl IntoIterator<Item = String>) -> Result<ProcessSpec> {
    let program = std::env::current_exe().context("cannot locate the testhost executable")?;
    Ok(ProcessSpec::new(program).args(raw_args.into_iter().skip(1).filter(|a| a != "--isolate")))
}

fn load_config(args: &Args) -> Result<HostConfig, testhost_runtime::ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Some(project) = &args.project {
        loader = loader.with_project_root(project);
    } else if let Ok(cwd) = std::env::current_dir() {
        loader = loader.with_project_root(cwd);
    }
    let mut config = loader.load()?;
    args.overrides().apply(&mut config);
    Ok(config)
}

/// Terminal filter: --debug > --verbose > RUST_LOG > "warn".
/// The file layer always uses `logging.file_level`.
fn init_tracing(args: &Args, config: &HostConfig) {
    let terminal_filter = if args.debug || config.debug {
        EnvFilter::new("debug")
    } else if args.verbose || config.ui.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_file = if config.logging.file {
        let dir = config
            .logging
            .directory
            .clone()
            .unwrap_or_else(|| config.results_dir());
        match LogFile::open(&dir) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot open log file in {}: {e}", dir.display());
                None
            }
        }
    } else {
        None
    };

    if let Some(file) = log_file {
        let path = file.path().to_path_buf();
        let file_filter = EnvFilter::new(&config.logging.file_level);
        let file_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .with(file_layer.with_filter(file_filter))
            .init();
        info!(path = %path.display(), level = %config.logging.file_level, "File logging enabled");
    } else {
        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .init();
    }
}

fn exit_with(code: ExitCode) -> ! {
    std::process::exit(code.code())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            exit_with(ExitCode::InvalidCommandLine);
        }
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_with(ExitCode::InvalidCommandLine);
        }
    };
    init_tracing(&args, &config);

    let options = ParsedOptions::parse(&args.options);
    let output = options
        .value(OUTPUT_OPTION)
        .and_then(|v| v.parse::<OutputMode>().ok())
        .unwrap_or_default();
    let severity = config.report.severity;
    let is_child = config.ipc.pipe_name.is_some();
    let reporter = CompositeExtensionFactory::new(move || {
        let reporter = ConsoleReporter::new(output, severity);
        if is_child {
            reporter.silent()
        } else {
            reporter
        }
    });

    let mut builder = TestApplication::builder(config)
        .request(args.request())
        .options(options);
    if let Some(pattern) = &args.filter {
        builder = builder.filter(TestFilter::new(pattern.as_str()));
    }
    if args.isolate && !is_child {
        builder = builder.isolate(child_spec(std::env::args())?);
    }

    if let Some(path) = &args.manifest {
        let manifest = match Manifest::load(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(code = e.code(), error = %e, "Cannot load manifest");
                eprintln!("Error: {e}");
                exit_with(ExitCode::InvalidCommandLine);
            }
        };
        builder.add_test_framework(move || Arc::new(ManifestFramework::new(manifest)));
    } else {
        warn!("No --manifest given");
    }
    builder
        .add_composite_data_consumer(&reporter)
        .add_composite_session_lifetime_handler(&reporter)
        .add_composite_process_lifetime_handler(&reporter)
        .add_composite_command_line_options_provider(&reporter);

    let app = match builder.build().await {
        Ok(app) => app,
        Err(e) => {
            error!(code = e.code(), error = %e, "Failed to build the test application");
            eprintln!("Error: {e}");
            exit_with(e.exit_code());
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            on_interrupt.cancel();
        }
    });

    let exit_code = app.run(cancel).await;
    reporter.get().print_summary(exit_code);
    exit_with(exit_code)
}
