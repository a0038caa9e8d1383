//! Validation of extension-contributed command-line options.
//!
//! Runs once at build time, before any session exists:
//!
//! 1. every option name is owned by exactly one enabled provider,
//! 2. every given option is known and has an acceptable number of values,
//! 3. the owning provider validates each value set,
//! 4. every provider validates the whole combination.

use crate::BuildError;
use std::collections::HashMap;
use std::sync::Arc;
use testhost_extension::{ArgumentArity, CommandLineOption, CommandLineOptionsProvider, ParsedOptions};
use tracing::debug;

fn describe(arity: ArgumentArity) -> &'static str {
    match arity {
        ArgumentArity::Zero => "no value",
        ArgumentArity::ZeroOrOne => "at most one value",
        ArgumentArity::ExactlyOne => "exactly one value",
        ArgumentArity::ZeroOrMore => "any number of values",
        ArgumentArity::OneOrMore => "at least one value",
    }
}

/// Checks `parsed` against the options declared by `providers`.
///
/// # Errors
///
/// [`BuildError::DuplicateOption`], [`BuildError::UnknownOption`],
/// [`BuildError::InvalidOption`] or [`BuildError::InvalidConfiguration`].
pub(crate) async fn validate_options(
    providers: &[Arc<dyn CommandLineOptionsProvider>],
    parsed: &ParsedOptions,
) -> Result<(), BuildError> {
    let mut owners: HashMap<String, (usize, CommandLineOption)> = HashMap::new();
    for (index, provider) in providers.iter().enumerate() {
        for option in provider.options() {
            if let Some((first, _)) = owners.get(&option.name) {
                return Err(BuildError::DuplicateOption {
                    option: option.name,
                    first: providers[*first].uid().clone(),
                    second: provider.uid().clone(),
                });
            }
            owners.insert(option.name.clone(), (index, option));
        }
    }

    for name in parsed.names() {
        let (index, option) = owners
            .get(name)
            .ok_or_else(|| BuildError::UnknownOption(name.to_string()))?;
        let values = parsed.values(name).unwrap_or_default();
        if !option.arity.accepts(values.len()) {
            return Err(BuildError::InvalidOption {
                option: name.to_string(),
                reason: format!("expects {}, got {}", describe(option.arity), values.len()),
            });
        }
        providers[*index]
            .validate_option(option, values)
            .await
            .map_err(|e| BuildError::invalid_option(name, &e))?;
    }

    for provider in providers {
        provider
            .validate_configuration(parsed)
            .await
            .map_err(|e| BuildError::InvalidConfiguration {
                provider: provider.uid().clone(),
                reason: e.to_string(),
            })?;
    }

    debug!(
        providers = providers.len(),
        declared = owners.len(),
        "Extension options validated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_extension::{async_trait, Extension, ExtensionError};
    use testhost_types::ExtensionId;

    struct Formats {
        id: ExtensionId,
        options: Vec<CommandLineOption>,
    }

    impl Formats {
        fn new(name: &str, options: Vec<CommandLineOption>) -> Arc<dyn CommandLineOptionsProvider> {
            Arc::new(Self {
                id: ExtensionId::builtin(name),
                options,
            })
        }
    }

    #[async_trait]
    impl Extension for Formats {
        fn uid(&self) -> &ExtensionId {
            &self.id
        }

        fn display_name(&self) -> &str {
            "formats"
        }
    }

    #[async_trait]
    impl CommandLineOptionsProvider for Formats {
        fn options(&self) -> Vec<CommandLineOption> {
            self.options.clone()
        }

        async fn validate_option(
            &self,
            option: &CommandLineOption,
            values: &[String],
        ) -> Result<(), ExtensionError> {
            if option.name == "severity" && values.iter().any(|v| v != "error" && v != "warning") {
                return Err(ExtensionError::InvalidOption {
                    option: option.name.clone(),
                    reason: "expected error or warning".into(),
                });
            }
            Ok(())
        }

        async fn validate_configuration(&self, options: &ParsedOptions) -> Result<(), ExtensionError> {
            if options.is_set("quiet") && options.is_set("verbose-report") {
                return Err(ExtensionError::Validation("quiet conflicts with verbose-report".into()));
            }
            Ok(())
        }
    }

    fn provider() -> Arc<dyn CommandLineOptionsProvider> {
        Formats::new(
            "formats",
            vec![
                CommandLineOption::new("severity", "Minimum severity", ArgumentArity::ExactlyOne),
                CommandLineOption::new("quiet", "Less output", ArgumentArity::Zero),
                CommandLineOption::new("verbose-report", "More output", ArgumentArity::Zero),
            ],
        )
    }

    #[tokio::test]
    async fn accepts_declared_options() {
        let parsed = ParsedOptions::parse(&["severity=warning", "quiet"]);
        validate_options(&[provider()], &parsed).await.expect("valid");
    }

    #[tokio::test]
    async fn rejects_unknown_option() {
        let parsed = ParsedOptions::parse(&["colour"]);
        let err = validate_options(&[provider()], &parsed).await.unwrap_err();
        assert!(matches!(err, BuildError::UnknownOption(name) if name == "colour"));
    }

    #[tokio::test]
    async fn rejects_wrong_arity() {
        let parsed = ParsedOptions::parse(&["severity"]);
        let err = validate_options(&[provider()], &parsed).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid option '--severity': expects exactly one value, got 0"
        );
    }

    #[tokio::test]
    async fn provider_rejects_value() {
        let parsed = ParsedOptions::parse(&["severity=info"]);
        let err = validate_options(&[provider()], &parsed).await.unwrap_err();
        assert!(matches!(err, BuildError::InvalidOption { option, .. } if option == "severity"));
    }

    #[tokio::test]
    async fn provider_rejects_combination() {
        let parsed = ParsedOptions::parse(&["quiet", "verbose-report"]);
        let err = validate_options(&[provider()], &parsed).await.unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn option_owned_twice_is_rejected() {
        let other = Formats::new(
            "other",
            vec![CommandLineOption::new("quiet", "Also quiet", ArgumentArity::Zero)],
        );
        let err = validate_options(&[provider(), other], &ParsedOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateOption { option, .. } if option == "quiet"));
    }
}
