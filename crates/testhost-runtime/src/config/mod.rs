//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌─────────────────────────────────────────────┐
//! │  1. CLI flags (ConfigResolver)              │  Per invocation
//! ├─────────────────────────────────────────────┤
//! │  2. Environment Variables (TESTHOST_*)      │  Runtime override
//! ├─────────────────────────────────────────────┤
//! │  3. Project Config (.testhost/config.toml)  │  Project-specific
//! ├─────────────────────────────────────────────┤
//! │  4. Global Config (~/.testhost/config.toml) │  User defaults
//! ├─────────────────────────────────────────────┤
//! │  5. Default Values (compile-time)           │  Fallback
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `TESTHOST_DEBUG` | `debug` | bool |
//! | `TESTHOST_PARALLELISM` | `execution.parallelism` | usize |
//! | `TESTHOST_RESULTS_DIRECTORY` | `results_directory` | PathBuf |
//! | `TESTHOST_PIPE_NAME` | `ipc.pipe_name` | String |
//! | `TESTHOST_TELEMETRY_OPTOUT`, `TESTHOST_CLI_TELEMETRY_OPTOUT` | `telemetry.opt_out` | bool |
//! | `TESTHOST_NOBANNER`, `TESTHOST_NOLOGO` | `ui.no_banner` | bool |
//! | `TESTHOST_LAUNCH_ATTACH_DEBUGGER` | `debugger.launch_on_start` | bool |
//!
//! # Example Configuration
//!
//! ```toml
//! # <project>/.testhost/config.toml
//! results_directory = "TestResults"
//!
//! [execution]
//! parallelism = 4
//! default_timeout_ms = 60000
//!
//! [report]
//! enabled = true
//! file_name = "run.txt"
//! severity = "warning"
//!
//! [crash_dump]
//! enabled = true
//! dump_type = "mini"
//! file_pattern = "testhost_%p_crash.dmp"
//!
//! [hang]
//! enabled = true
//! timeout_ms = 600000
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::ConfigError;
pub use loader::{validate, ConfigLoader};
pub use resolver::{ConfigResolver, NoOpResolver};
pub use types::{
    CrashDumpConfig, DebuggerConfig, DumpType, ExecutionConfig, HangConfig, HostConfig,
    IpcConfig, LoggingConfig, ReportConfig, ReportSeverity, TelemetryConfig, UiConfig,
};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".testhost")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".testhost";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
