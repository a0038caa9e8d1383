//! Shared E2E test helpers for `testhost` binary tests.

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Timeout for in-process runs.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Timeout for runs that launch a child test host.
pub const TIMEOUT_ISOLATED: Duration = Duration::from_secs(20);

/// Variables that would change how the binary behaves if inherited from
/// the developer's shell.
const HOST_VARS: &[&str] = &[
    "TESTHOST_PIPE_NAME",
    "TESTHOST_PARALLELISM",
    "TESTHOST_RESULTS_DIRECTORY",
    "TESTHOST_LAUNCH_ATTACH_DEBUGGER",
    "TESTHOST_NOBANNER",
    "TESTHOST_NOLOGO",
    "TESTHOST_DEBUG",
    "RUST_LOG",
];

/// A scratch workspace: HOME, project directory and manifests.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn results(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Writes a manifest and returns its path.
    pub fn manifest(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write manifest");
        path
    }

    /// Command for the binary, isolated from global config and the
    /// caller's environment. The banner is off unless a test asks for it.
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = self.raw_cmd();
        cmd.arg("--no-banner");
        cmd
    }

    /// Like [`cmd`](Self::cmd) but with the banner left on.
    pub fn raw_cmd(&self) -> assert_cmd::Command {
        let mut cmd: assert_cmd::Command = cargo_bin_cmd!("testhost");
        cmd.timeout(TIMEOUT_BASIC)
            .current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("TESTHOST_TELEMETRY_OPTOUT", "1")
            .arg("--results-directory")
            .arg(self.results());
        for var in HOST_VARS {
            cmd.env_remove(var);
        }
        cmd
    }
}

pub const PASSING: &str = r#"
[suite]
name = "arithmetic"
banner = "arithmetic suite v1"

[[test]]
uid = "math::adds"

[[test]]
uid = "math::subtracts"
delay_ms = 5
"#;

pub const MIXED: &str = r#"
[[test]]
uid = "math::adds"

[[test]]
uid = "math::divides"
outcome = "fail"
expected = "2"
actual = "3"

[[test]]
uid = "gui::renders"
skip = "no display"
"#;
