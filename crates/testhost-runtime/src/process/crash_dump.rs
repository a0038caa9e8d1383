//! Crash dump collection.
//!
//! [`CrashDumpHandler`] is one extension serving three roles:
//!
//! | Role | Behaviour |
//! |------|-----------|
//! | Environment provider | Injects the dump variables under every prefix, then checks nobody overrode them |
//! | Process lifetime handler | On an ungraceful exit, publishes the dump as a [`FileArtifact`] |
//! | Data producer | Declares [`MessageKind::FileArtifact`] |
//!
//! Injected per prefix (`DOTNET_`, `COMPlus_` by default):
//!
//! ```text
//! {prefix}DbgEnableMiniDump=1
//! {prefix}DbgMiniDumpType=<1..4>
//! {prefix}DbgMiniDumpName=<results dir>/<pattern with %p>
//! {prefix}CreateDumpDiagnostics=1
//! ```
//!
//! When the expected `%p`-substituted file is missing, every `*.dmp` in the
//! results directory is published instead.

use crate::config::CrashDumpConfig;
use std::path::{Path, PathBuf};
use testhost_extension::{
    async_trait, DataProducer, EnvironmentVariable, EnvironmentVariableProvider,
    EnvironmentVariables, Extension, ExtensionError, MessagePublisher, ProcessLifetimeHandler,
    ProcessLifetimeRecord,
};
use testhost_message::{FileArtifact, Message, MessageKind};
use testhost_types::ExtensionId;
use tracing::{debug, info, warn};

/// Placeholder replaced with the process id.
pub const PID_PLACEHOLDER: &str = "%p";

/// Extension of dump files.
pub const DUMP_EXTENSION: &str = "dmp";

/// Enables dump generation in a test host and collects the result.
#[derive(Debug, Clone)]
pub struct CrashDumpHandler {
    id: ExtensionId,
    config: CrashDumpConfig,
    directory: PathBuf,
}

impl CrashDumpHandler {
    /// Creates a handler writing dumps into `directory`.
    #[must_use]
    pub fn new(config: CrashDumpConfig, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: ExtensionId::builtin("crash-dump"),
            config,
            directory: directory.into(),
        }
    }

    /// Dump path with the placeholder left in.
    #[must_use]
    pub fn dump_pattern(&self) -> PathBuf {
        self.directory.join(&self.config.file_pattern)
    }

    /// Dump path expected for `pid`.
    #[must_use]
    pub fn expected_dump(&self, pid: u32) -> PathBuf {
        self.directory
            .join(self.config.file_pattern.replace(PID_PLACEHOLDER, &pid.to_string()))
    }

    /// Variables injected into the child.
    #[must_use]
    pub fn variables(&self) -> Vec<(String, String)> {
        let pattern = self.dump_pattern().display().to_string();
        let mut vars = Vec::with_capacity(self.config.env_prefixes.len() * 4);
        for prefix in &self.config.env_prefixes {
            vars.push((format!("{}DbgEnableMiniDump", prefix), "1".to_string()));
            vars.push((
                format!("{}DbgMiniDumpType", prefix),
                self.config.dump_type.env_value().to_string(),
            ));
            vars.push((format!("{}DbgMiniDumpName", prefix), pattern.clone()));
            vars.push((format!("{}CreateDumpDiagnostics", prefix), "1".to_string()));
        }
        vars
    }

    async fn publish_dump(
        &self,
        path: &Path,
        description: &str,
        publisher: &dyn MessagePublisher,
    ) -> Result<(), ExtensionError> {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let artifact = Message::FileArtifact(FileArtifact {
            path: path.to_path_buf(),
            display_name,
            description: Some(description.to_string()),
        });
        publisher.publish(self, artifact).await
    }

    fn dumps_in_directory(&self) -> Vec<PathBuf> {
        let pattern = self.directory.join(format!("*.{}", DUMP_EXTENSION));
        let pattern = pattern.to_string_lossy();
        match glob::glob(&pattern) {
            Ok(paths) => {
                let mut found: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
                found.sort();
                found
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid dump search pattern");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Extension for CrashDumpHandler {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Crash dump"
    }

    fn description(&self) -> &str {
        "Collects a memory dump when the test host crashes"
    }

    async fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl DataProducer for CrashDumpHandler {
    fn produced_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::FileArtifact]
    }
}

#[async_trait]
impl EnvironmentVariableProvider for CrashDumpHandler {
    async fn update(&self, env: &mut EnvironmentVariables) -> Result<(), ExtensionError> {
        for (name, value) in self.variables() {
            env.set(EnvironmentVariable::new(name, value))?;
        }
        debug!(pattern = %self.dump_pattern().display(), "Crash dump variables injected");
        Ok(())
    }

    async fn validate(&self, env: &EnvironmentVariables) -> Result<(), ExtensionError> {
        for (name, expected) in self.variables() {
            match env.value(&name) {
                Some(actual) if actual == expected => {}
                actual => {
                    return Err(ExtensionError::Validation(format!(
                        "{} was overridden: expected '{}', found '{}'",
                        name,
                        expected,
                        actual.unwrap_or("<unset>")
                    )))
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessLifetimeHandler for CrashDumpHandler {
    async fn before_start(&self) -> Result<(), ExtensionError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| ExtensionError::failed(format!("cannot create dump directory: {}", e)))
    }

    async fn on_exited(
        &self,
        record: &ProcessLifetimeRecord,
        publisher: &dyn MessagePublisher,
    ) -> Result<(), ExtensionError> {
        if !record.is_ungraceful() {
            return Ok(());
        }

        let expected = self.expected_dump(record.pid);
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            info!(pid = record.pid, path = %expected.display(), "Crash dump collected");
            return self
                .publish_dump(&expected, "Crash dump of the test host", publisher)
                .await;
        }

        warn!(
            pid = record.pid,
            expected = %expected.display(),
            "Expected crash dump not found, publishing every dump in the directory"
        );
        for path in self.dumps_in_directory() {
            self.publish_dump(
                &path,
                &format!("Dump found after test host {} crashed", record.pid),
                publisher,
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DumpType;
    use parking_lot::Mutex;
    use std::time::SystemTime;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Message>>);

    #[async_trait]
    impl MessagePublisher for Collect {
        async fn publish(
            &self,
            producer: &dyn DataProducer,
            message: Message,
        ) -> Result<(), ExtensionError> {
            assert!(producer.produced_kinds().contains(&message.kind()));
            self.0.lock().push(message);
            Ok(())
        }
    }

    fn handler(dir: &Path) -> CrashDumpHandler {
        CrashDumpHandler::new(
            CrashDumpConfig {
                enabled: true,
                dump_type: DumpType::Mini,
                ..Default::default()
            },
            dir,
        )
    }

    fn crashed(pid: u32) -> ProcessLifetimeRecord {
        ProcessLifetimeRecord {
            pid,
            started_at: SystemTime::now(),
            exit_code: Some(134),
            graceful: false,
        }
    }

    fn artifact_paths(collect: &Collect) -> Vec<PathBuf> {
        collect
            .0
            .lock()
            .iter()
            .filter_map(|m| match m {
                Message::FileArtifact(a) => Some(a.path.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn injects_variables_under_each_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler(dir.path());
        let mut env = EnvironmentVariables::new();

        handler.update(&mut env).await.expect("update");

        assert_eq!(env.len(), 8);
        assert_eq!(env.value("DOTNET_DbgEnableMiniDump"), Some("1"));
        assert_eq!(env.value("COMPlus_DbgMiniDumpType"), Some("1"));
        assert_eq!(env.value("DOTNET_CreateDumpDiagnostics"), Some("1"));
        assert!(env
            .value("DOTNET_DbgMiniDumpName")
            .is_some_and(|v| v.ends_with("testhost_%p_crash.dmp")));
        handler.validate(&env).await.expect("untouched env is valid");
    }

    #[tokio::test]
    async fn overridden_variable_fails_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler(dir.path());
        let mut env = EnvironmentVariables::new();
        handler.update(&mut env).await.expect("update");
        env.set(EnvironmentVariable::new("COMPlus_DbgMiniDumpType", "4"))
            .expect("override");

        let err = handler.validate(&env).await.unwrap_err();
        assert!(matches!(err, ExtensionError::Validation(msg) if msg.contains("COMPlus_DbgMiniDumpType")));
    }

    #[tokio::test]
    async fn publishes_expected_dump() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler(dir.path());
        let dump = dir.path().join("testhost_4242_crash.dmp");
        std::fs::write(&dump, b"dump").expect("write dump");
        std::fs::write(dir.path().join("other.dmp"), b"dump").expect("write other");
        let collect = Collect::default();

        handler.on_exited(&crashed(4242), &collect).await.expect("exit hook");

        assert_eq!(artifact_paths(&collect), vec![dump]);
    }

    #[tokio::test]
    async fn falls_back_to_every_dump() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler(dir.path());
        std::fs::write(dir.path().join("a.dmp"), b"1").expect("write");
        std::fs::write(dir.path().join("b.dmp"), b"2").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"3").expect("write");
        let collect = Collect::default();

        handler.on_exited(&crashed(7), &collect).await.expect("exit hook");

        assert_eq!(
            artifact_paths(&collect),
            vec![dir.path().join("a.dmp"), dir.path().join("b.dmp")]
        );
    }

    #[tokio::test]
    async fn graceful_exit_publishes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler(dir.path());
        std::fs::write(dir.path().join("testhost_1_crash.dmp"), b"1").expect("write");
        let collect = Collect::default();
        let record = ProcessLifetimeRecord {
            graceful: true,
            ..crashed(1)
        };

        handler.on_exited(&record, &collect).await.expect("exit hook");

        assert!(artifact_paths(&collect).is_empty());
    }
}
