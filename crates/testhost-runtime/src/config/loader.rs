//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.testhost/config.toml`)
//! 3. Project config (`.testhost/config.toml`)
//! 4. Environment variables (`TESTHOST_*`)
//!
//! Each layer overrides the previous. CLI flags are applied afterwards by a
//! [`ConfigResolver`](super::ConfigResolver).

use super::{default_config_path, ConfigError, HostConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
///
/// Several names may alias one field; any alias set to a true value wins.
macro_rules! parse_env_bool {
    ($loader:expr, $field:expr, $($var:literal),+) => {
        $(
            if let Some(val) = $loader.env_var($var) {
                if parse_bool(&val)
                    .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?
                {
                    $field = true;
                }
            }
        )+
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```
/// use testhost_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .skip_global_config()
///     .with_project_root("/nonexistent")
///     .with_env([("TESTHOST_PARALLELISM", "3")])
///     .load()
///     .unwrap();
/// assert_eq!(config.execution.parallelism, Some(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to ~/.testhost/config.toml).
    global_config_path: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    /// Replaces the process environment when set.
    env: Option<HashMap<String, String>>,

    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.testhost/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Reads environment variables from `vars` instead of the process.
    #[must_use]
    pub fn with_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be parsed,
    /// or an environment variable holds an invalid value.
    /// Missing config files are silently ignored.
    pub fn load(&self) -> Result<HostConfig, ConfigError> {
        let mut config = HostConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = self.load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = self.load_file(&project_config_path)? {
                    debug!(
                        path = %project_config_path.display(),
                        project = %project_root.display(),
                        "Loaded project config"
                    );
                    config.merge(&project_config);
                }
            }
        }

        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }

        validate(&config)?;
        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<HostConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            HostConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(&self, config: &mut HostConfig) -> Result<(), ConfigError> {
        parse_env_bool!(self, config.debug, "TESTHOST_DEBUG");
        parse_env_bool!(
            self,
            config.telemetry.opt_out,
            "TESTHOST_TELEMETRY_OPTOUT",
            "TESTHOST_CLI_TELEMETRY_OPTOUT"
        );
        parse_env_bool!(self, config.ui.no_banner, "TESTHOST_NOBANNER", "TESTHOST_NOLOGO");
        parse_env_bool!(
            self,
            config.debugger.launch_on_start,
            "TESTHOST_LAUNCH_ATTACH_DEBUGGER"
        );

        if let Some(val) = self.env_var("TESTHOST_PARALLELISM") {
            let parsed = val
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::invalid_env_var("TESTHOST_PARALLELISM", "expected a positive integer"))?;
            config.execution.parallelism = Some(parsed);
        }

        if let Some(val) = self.env_var("TESTHOST_RESULTS_DIRECTORY") {
            config.results_directory = Some(PathBuf::from(val));
        }

        if let Some(val) = self.env_var("TESTHOST_PIPE_NAME") {
            config.ipc.pipe_name = Some(val);
        }

        Ok(())
    }
}

/// Checks values that no single layer can validate on its own.
///
/// # Errors
///
/// [`ConfigError::InvalidValue`] for out-of-range values.
pub fn validate(config: &HostConfig) -> Result<(), ConfigError> {
    if config.execution.parallelism == Some(0) {
        return Err(ConfigError::invalid_value(
            "execution.parallelism",
            "must be at least 1",
        ));
    }
    if config.execution.default_timeout_ms == Some(0) {
        return Err(ConfigError::invalid_value(
            "execution.default_timeout_ms",
            "must be greater than 0",
        ));
    }
    if config.crash_dump.enabled && !config.crash_dump.file_pattern.contains("%p") {
        return Err(ConfigError::invalid_value(
            "crash_dump.file_pattern",
            "must contain the %p placeholder",
        ));
    }
    if config.hang.enabled && config.hang.timeout_ms == 0 {
        return Err(ConfigError::invalid_value(
            "hang.timeout_ms",
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
