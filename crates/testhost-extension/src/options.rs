//! Command-line options contributed by extensions.
//!
//! Providers declare their options up front. The application parses
//! `--option name[=value]` arguments into [`ParsedOptions`], checks each
//! value against the declared [`ArgumentArity`], then lets every enabled
//! provider validate its own values. Any failure is a configuration error
//! reported before a session is created.

use crate::{Extension, ExtensionError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// How many values an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentArity {
    /// A flag.
    Zero,
    ZeroOrOne,
    ExactlyOne,
    ZeroOrMore,
    OneOrMore,
}

impl ArgumentArity {
    /// Returns `true` if `count` values are acceptable.
    #[must_use]
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Zero => count == 0,
            Self::ZeroOrOne => count <= 1,
            Self::ExactlyOne => count == 1,
            Self::ZeroOrMore => true,
            Self::OneOrMore => count >= 1,
        }
    }
}

/// An option declared by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineOption {
    pub name: String,
    pub description: String,
    pub arity: ArgumentArity,
    pub hidden: bool,
}

impl CommandLineOption {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, arity: ArgumentArity) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arity,
            hidden: false,
        }
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Extension option values, keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    values: BTreeMap<String, Vec<String>>,
}

impl ParsedOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name` or `name=value` entries. Repeated names accumulate.
    #[must_use]
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut parsed = Self::new();
        for entry in raw {
            let entry = entry.as_ref().trim_start_matches("--");
            match entry.split_once('=') {
                Some((name, value)) => parsed.add(name, Some(value)),
                None => parsed.add(entry, None),
            }
        }
        parsed
    }

    /// Records an occurrence of `name`, with an optional value.
    pub fn add(&mut self, name: &str, value: Option<&str>) {
        let values = self.values.entry(name.to_string()).or_default();
        if let Some(value) = value {
            values.push(value.to_string());
        }
    }

    /// Returns `true` if the option was given.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Values given for `name`.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// First value given for `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Option names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Contributes and validates extension options.
#[async_trait]
pub trait CommandLineOptionsProvider: Extension {
    /// Options this provider owns.
    fn options(&self) -> Vec<CommandLineOption>;

    /// Validates the values of one option. Arity was already checked.
    async fn validate_option(
        &self,
        _option: &CommandLineOption,
        _values: &[String],
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Validates the combination of all parsed options.
    async fn validate_configuration(&self, _options: &ParsedOptions) -> Result<(), ExtensionError> {
        Ok(())
    }
}
