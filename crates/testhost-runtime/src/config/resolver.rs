//! Configuration resolver trait for layered overrides.
//!
//! # Architecture
//!
//! ```text
//! ConfigLoader.load()  →  HostConfig (base)
//!                              │
//!                              ▼
//!                     ConfigResolver.apply()
//!                              │
//!                              ▼
//!                     HostConfig (final)
//! ```
//!
//! The binary implements this for its parsed command line; library users
//! can implement it for programmatic settings.

use super::HostConfig;

/// Trait for applying configuration overrides.
pub trait ConfigResolver {
    /// Applies overrides to the given configuration.
    ///
    /// Only values that were actually specified should be applied.
    fn apply(&self, config: &mut HostConfig);
}

/// No-op resolver that makes no changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResolver;

impl ConfigResolver for NoOpResolver {
    fn apply(&self, _config: &mut HostConfig) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_resolver_does_nothing() {
        let mut config = HostConfig::default();
        let original = config.clone();

        NoOpResolver.apply(&mut config);

        assert_eq!(config, original);
    }

    #[test]
    fn custom_resolver() {
        struct Parallelism(Option<usize>);

        impl ConfigResolver for Parallelism {
            fn apply(&self, config: &mut HostConfig) {
                if let Some(p) = self.0 {
                    config.execution.parallelism = Some(p);
                }
            }
        }

        let mut config = HostConfig::default();
        Parallelism(None).apply(&mut config);
        assert_eq!(config.execution.parallelism, None);

        Parallelism(Some(3)).apply(&mut config);
        assert_eq!(config.execution.parallelism, Some(3));
    }
}
