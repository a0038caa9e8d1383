//! Environment of a launched test host.
//!
//! Before a controller spawns a test host, every enabled
//! [`EnvironmentVariableProvider`] may edit the child's environment, then
//! every provider validates the final result. Validation lets a provider
//! notice that a later provider overrode a value it depends on.
//!
//! ```text
//! inherit() ─► update(A) ─► update(B) ─► validate(A) ─► validate(B) ─► spawn
//! ```

use crate::{Extension, ExtensionError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One variable set by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    /// Value is not written to logs.
    pub secret: bool,
    /// Later providers may not overwrite or remove it.
    pub locked: bool,
}

impl EnvironmentVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secret: false,
            locked: false,
        }
    }

    #[must_use]
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    #[must_use]
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Mutable environment of the process about to be launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariables {
    vars: BTreeMap<String, EnvironmentVariable>,
}

impl EnvironmentVariables {
    /// An empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    #[must_use]
    pub fn inherit() -> Self {
        let mut env = Self::new();
        for (name, value) in std::env::vars() {
            env.vars
                .insert(name.clone(), EnvironmentVariable::new(name, value));
        }
        env
    }

    /// Sets a variable.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::EnvironmentLocked`] if an existing variable with
    /// the same name is locked.
    pub fn set(&mut self, var: EnvironmentVariable) -> Result<(), ExtensionError> {
        if let Some(existing) = self.vars.get(&var.name) {
            if existing.locked {
                return Err(ExtensionError::EnvironmentLocked { name: var.name });
            }
        }
        self.vars.insert(var.name.clone(), var);
        Ok(())
    }

    /// Removes a variable.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::EnvironmentLocked`] if the variable is locked.
    pub fn remove(&mut self, name: &str) -> Result<Option<EnvironmentVariable>, ExtensionError> {
        match self.vars.get(name) {
            Some(existing) if existing.locked => Err(ExtensionError::EnvironmentLocked {
                name: name.to_string(),
            }),
            _ => Ok(self.vars.remove(name)),
        }
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EnvironmentVariable> {
        self.vars.get(name)
    }

    /// Looks up a variable's value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }

    /// `(name, value)` pairs, ready for `Command::envs`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .values()
            .map(|v| (v.name.as_str(), v.value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Edits and validates the environment of a launched test host.
#[async_trait]
pub trait EnvironmentVariableProvider: Extension {
    /// Adds or changes variables.
    async fn update(&self, env: &mut EnvironmentVariables) -> Result<(), ExtensionError>;

    /// Checks the final environment after every provider ran.
    async fn validate(&self, _env: &EnvironmentVariables) -> Result<(), ExtensionError> {
        Ok(())
    }
}
