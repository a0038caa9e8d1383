//! Manifest-driven test framework.
//!
//! A manifest is a TOML file that describes a suite and the outcome each
//! test produces. It lets the host be exercised end to end without a
//! language-specific test adapter.
//!
//! ```toml
//! [suite]
//! name = "arithmetic"
//! banner = "arithmetic suite v1"   # optional, takes over the banner
//!
//! [[test]]
//! uid = "math::adds"
//!
//! [[test]]
//! uid = "math::divides"
//! outcome = "fail"
//! expected = "2"
//! actual = "3"
//!
//! [[test]]
//! uid = "net::download"
//! outcome = "hang"
//! timeout_ms = 100
//!
//! [[test]]
//! uid = "gui::renders"
//! skip = "no display"
//! ```
//!
//! # Outcomes
//!
//! | `outcome` | Body behaviour |
//! |-----------|----------------|
//! | `pass` (default) | returns normally |
//! | `fail` | assertion failure (`expected`/`actual` or `message`) |
//! | `error` | non-assertion failure with `message` |
//! | `hang` | waits for cancellation |
//! | `crash` | aborts the whole process |
//!
//! Every outcome first sleeps `delay_ms`, if given.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testhost_extension::{
    async_trait, CancellationToken, Capabilities, Capability, DiscoveryContext, Extension,
    ExtensionError, TestCase, TestFailure, TestFramework,
};
use testhost_types::{ErrorCode, ExtensionId};
use thiserror::Error;
use tracing::{debug, info};

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("test '{0}' is declared twice")]
    DuplicateTest(String),
}

impl ErrorCode for ManifestError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "MANIFEST_READ_FAILED",
            Self::Parse { .. } => "MANIFEST_PARSE_FAILED",
            Self::DuplicateTest(_) => "MANIFEST_DUPLICATE_TEST",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// What a manifest test does when executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pass,
    Fail,
    Error,
    Hang,
    Crash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SuiteSection {
    pub name: Option<String>,
    pub banner: Option<String>,
}

/// One `[[test]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestEntry {
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Skip reason; an empty string skips without a reason.
    #[serde(default)]
    pub skip: Option<String>,
}

impl TestEntry {
    fn to_case(&self) -> TestCase {
        let mut case = TestCase::new(self.uid.as_str(), self.name.as_deref().unwrap_or(&self.uid));
        if let Some(reason) = &self.skip {
            case = case.skipped((!reason.is_empty()).then(|| reason.clone()));
        }
        if let Some(ms) = self.timeout_ms {
            case = case.with_timeout(Duration::from_millis(ms));
        }
        case
    }

    fn failure(&self) -> TestFailure {
        match (&self.expected, &self.actual, &self.message) {
            (Some(expected), Some(actual), _) => TestFailure::mismatch(expected, actual),
            (_, _, Some(message)) => TestFailure::assertion(message),
            _ => TestFailure::assertion(format!("{} failed", self.uid)),
        }
    }
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub suite: SuiteSection,
    #[serde(rename = "test")]
    pub tests: Vec<TestEntry>,
}

impl Manifest {
    /// Reads and validates a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the file cannot be read, is not valid
    /// TOML for this schema, or declares a test uid twice.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_toml(&content).map_err(|e| match e {
            ManifestError::Parse { message, .. } => ManifestError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        debug!(path = %path.display(), tests = manifest.tests.len(), "Loaded manifest");
        Ok(manifest)
    }

    /// Parses manifest text.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        let mut seen = HashSet::new();
        for test in &manifest.tests {
            if !seen.insert(test.uid.as_str()) {
                return Err(ManifestError::DuplicateTest(test.uid.clone()));
            }
        }
        Ok(manifest)
    }
}

/// [`TestFramework`] backed by a [`Manifest`].
#[derive(Debug)]
pub struct ManifestFramework {
    id: ExtensionId,
    manifest: Manifest,
}

impl ManifestFramework {
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            id: ExtensionId::new("framework", "manifest"),
            manifest,
        }
    }

    fn entry(&self, case: &TestCase) -> Option<&TestEntry> {
        self.manifest
            .tests
            .iter()
            .find(|t| t.uid == case.uid.as_str())
    }
}

#[async_trait]
impl Extension for ManifestFramework {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        self.manifest.suite.name.as_deref().unwrap_or("Manifest tests")
    }

    fn description(&self) -> &str {
        "Runs tests described by a TOML manifest"
    }
}

#[async_trait]
impl TestFramework for ManifestFramework {
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new([Capability::Filtering]);
        if let Some(banner) = &self.manifest.suite.banner {
            caps.insert(Capability::banner(banner.clone()));
        }
        caps
    }

    async fn discover(&self, ctx: &DiscoveryContext) -> Result<Vec<TestCase>, ExtensionError> {
        let cases: Vec<TestCase> = self
            .manifest
            .tests
            .iter()
            .map(TestEntry::to_case)
            .filter(|case| ctx.filter.as_ref().map_or(true, |f| f.matches(case)))
            .collect();
        info!(session = %ctx.session_uid, tests = cases.len(), "Manifest discovery complete");
        Ok(cases)
    }

    async fn execute(&self, case: &TestCase, cancel: CancellationToken) -> Result<(), TestFailure> {
        let entry = self
            .entry(case)
            .ok_or_else(|| TestFailure::Infrastructure(format!("{} is not in the manifest", case.uid)))?;

        if let Some(ms) = entry.delay_ms {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = cancel.cancelled() => return Err(TestFailure::Cancelled),
            }
        }

        match entry.outcome {
            Outcome::Pass => Ok(()),
            Outcome::Fail => Err(entry.failure()),
            Outcome::Error => Err(TestFailure::exception(
                "ManifestError",
                entry.message.clone().unwrap_or_else(|| "test raised an error".into()),
            )),
            Outcome::Hang => {
                cancel.cancelled().await;
                Err(TestFailure::Cancelled)
            }
            Outcome::Crash => {
                eprintln!("{} crashed the test host", case.uid);
                std::process::abort()
            }
        }
    }
}
