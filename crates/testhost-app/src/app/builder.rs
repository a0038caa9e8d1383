//! Builder for [`TestApplication`].

use super::{ApplicationProducer, ClientSlot, ResultForwarder, TestApplication};
use crate::controller::ControllerProducer;
use crate::options::validate_options;
use crate::BuildError;
use std::sync::Arc;
use testhost_extension::{
    CommandLineOptionsProvider, DataConsumer, DataProducer, EnvironmentVariableProvider,
    ParsedOptions, ProcessLifetimeHandler, TestFilter, TestFramework, TestSessionLifetimeHandler,
};
use testhost_runtime::config::validate;
use testhost_runtime::execution::CoordinatorProducer;
use testhost_runtime::process::ProcessSpec;
use testhost_runtime::session::SessionProducer;
use testhost_runtime::{
    CompositeExtensionFactory, ConfigResolver, CrashDumpHandler, ExtensionRegistry, HostConfig,
    MessageBusBuilder, SessionRequest,
};
use tracing::{debug, info, warn};

macro_rules! registration {
    ($add:ident, $composite:ident, $registry_add:ident, $role:path) => {
        #[doc = concat!("Registers a `", stringify!($role), "` factory. It runs once, at build time.")]
        pub fn $add<T, F>(&mut self, factory: F) -> &mut Self
        where
            T: $role + 'static,
            F: FnOnce() -> Arc<T> + Send + 'static,
        {
            match self.registry.as_mut() {
                Some(registry) => registry.$registry_add(move || factory() as Arc<dyn $role>),
                None => warn!(role = stringify!($role), "Registration after build() ignored"),
            }
            self
        }

        #[doc = concat!("Registers a shared instance as a `", stringify!($role), "`.")]
        ///
        /// Every role registered from the same composite receives the
        /// same instance.
        pub fn $composite<T>(&mut self, composite: &Arc<CompositeExtensionFactory<T>>) -> &mut Self
        where
            T: $role + 'static,
        {
            let composite = Arc::clone(composite);
            self.$add(move || composite.get())
        }
    };
}

/// Fluent composition root.
///
/// Registration methods take factories, not instances; nothing is
/// constructed until [`build`](Self::build). Launch parameters (request,
/// filter, extension options, isolation) are set with the consuming
/// `with_*`-style methods.
///
/// # Example
///
/// ```ignore
/// let shared = CompositeExtensionFactory::new(JunitReporter::new);
///
/// let mut builder = TestApplicationBuilder::new(config)
///     .request(SessionRequest::Run)
///     .options(ParsedOptions::parse(&["junit-output=out.xml"]));
/// builder
///     .add_test_framework(|| Arc::new(MyFramework::new()))
///     .add_composite_data_consumer(&shared)
///     .add_composite_session_lifetime_handler(&shared);
///
/// let app = builder.build().await?;
/// ```
pub struct TestApplicationBuilder {
    config: HostConfig,
    /// Taken by the first `build()`.
    registry: Option<ExtensionRegistry>,
    options: ParsedOptions,
    request: SessionRequest,
    filter: Option<TestFilter>,
    isolation: Option<ProcessSpec>,
}

impl TestApplicationBuilder {
    #[must_use]
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            registry: Some(ExtensionRegistry::new()),
            options: ParsedOptions::new(),
            request: SessionRequest::Run,
            filter: None,
            isolation: None,
        }
    }

    /// Applies overrides on top of the configuration.
    #[must_use]
    pub fn resolve_with(mut self, resolver: &dyn ConfigResolver) -> Self {
        resolver.apply(&mut self.config);
        self
    }

    /// Serves `request` instead of the default Run.
    #[must_use]
    pub fn request(mut self, request: SessionRequest) -> Self {
        self.request = request;
        self
    }

    /// Restricts the session to tests matching `filter`.
    #[must_use]
    pub fn filter(mut self, filter: TestFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Extension option values, validated at build time.
    #[must_use]
    pub fn options(mut self, options: ParsedOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the tests in a child process launched from `spec` instead of
    /// in this process.
    #[must_use]
    pub fn isolate(mut self, spec: ProcessSpec) -> Self {
        self.isolation = Some(spec);
        self
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    registration!(
        add_test_framework,
        add_composite_test_framework,
        add_framework,
        TestFramework
    );
    registration!(
        add_data_producer,
        add_composite_data_producer,
        add_producer,
        DataProducer
    );
    registration!(
        add_data_consumer,
        add_composite_data_consumer,
        add_consumer,
        DataConsumer
    );
    registration!(
        add_session_lifetime_handler,
        add_composite_session_lifetime_handler,
        add_session_handler,
        TestSessionLifetimeHandler
    );
    registration!(
        add_process_lifetime_handler,
        add_composite_process_lifetime_handler,
        add_process_handler,
        ProcessLifetimeHandler
    );
    registration!(
        add_environment_variable_provider,
        add_composite_environment_variable_provider,
        add_environment_provider,
        EnvironmentVariableProvider
    );
    registration!(
        add_command_line_options_provider,
        add_composite_command_line_options_provider,
        add_options_provider,
        CommandLineOptionsProvider
    );

    /// Instantiates every registered extension, evaluates enablement and
    /// wires the message bus.
    ///
    /// # Errors
    ///
    /// - [`BuildError::AlreadyBuilt`] on the second call
    /// - [`BuildError::MissingFramework`] / [`BuildError::DuplicateFramework`]
    ///   unless exactly one framework was registered
    /// - [`BuildError::Config`] for invalid configuration values
    /// - [`BuildError::Registry`] when two instances share an identity
    /// - [`BuildError::NoEnabledFramework`] if the framework disabled itself
    /// - option errors from extension option validation
    pub async fn build(&mut self) -> Result<TestApplication, BuildError> {
        let registry = self.registry.take().ok_or(BuildError::AlreadyBuilt)?;
        match registry.framework_count() {
            0 => return Err(BuildError::MissingFramework),
            1 => {}
            n => return Err(BuildError::DuplicateFramework(n)),
        }
        validate(&self.config)?;

        let extensions = registry.resolve().await?;
        let framework = extensions
            .framework()
            .cloned()
            .ok_or(BuildError::NoEnabledFramework)?;
        validate_options(&extensions.option_providers, &self.options).await?;

        let crash_dump = (self.isolation.is_some() && self.config.crash_dump.enabled).then(|| {
            Arc::new(CrashDumpHandler::new(
                self.config.crash_dump.clone(),
                self.config.results_dir(),
            ))
        });
        let client_slot = ClientSlot::new();
        let producer = ApplicationProducer::new();

        let mut bus = MessageBusBuilder::new()
            .producer(&CoordinatorProducer::new())
            .producer(&SessionProducer::new())
            .producer(&producer);
        if self.isolation.is_some() {
            bus = bus.producer(&ControllerProducer::new());
        }
        if let Some(dumps) = &crash_dump {
            bus = bus.producer(&**dumps);
        }
        for extension in &extensions.producers {
            bus = bus.producer(&**extension);
        }
        for consumer in &extensions.consumers {
            bus = bus.consumer(Arc::clone(consumer));
        }
        if self.config.ipc.pipe_name.is_some() && self.isolation.is_none() {
            bus = bus.consumer(Arc::new(ResultForwarder::new(client_slot.clone())));
        }
        let bus = bus.build();

        info!(
            framework = %framework.uid(),
            consumers = extensions.consumers.len(),
            disabled = extensions.disabled.len(),
            "Test application built"
        );
        debug!(request = %self.request, isolated = self.isolation.is_some(), "Launch parameters");

        Ok(TestApplication {
            config: self.config.clone(),
            framework,
            extensions,
            bus,
            producer,
            request: self.request,
            filter: self.filter.clone(),
            isolation: self.isolation.clone(),
            crash_dump,
            client_slot,
        })
    }
}

impl std::fmt::Debug for TestApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestApplicationBuilder")
            .field("built", &self.registry.is_none())
            .field("request", &self.request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_extension::testing::{RecordingConsumer, RecordingSessionHandler, ScriptedFramework};
    use testhost_message::MessageKind;
    use testhost_types::ExtensionId;

    fn builder() -> TestApplicationBuilder {
        let mut config = HostConfig::default();
        config.ui.no_banner = true;
        TestApplicationBuilder::new(config)
    }

    #[tokio::test]
    async fn build_requires_a_framework() {
        let err = builder().build().await.unwrap_err();
        assert!(matches!(err, BuildError::MissingFramework));
    }

    #[tokio::test]
    async fn build_rejects_two_frameworks() {
        let mut b = builder();
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()))
            .add_test_framework(|| {
                Arc::new(ScriptedFramework::new().with_id(ExtensionId::builtin("second")))
            });
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, BuildError::DuplicateFramework(2)));
    }

    #[tokio::test]
    async fn build_twice_fails() {
        let mut b = builder();
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()));
        b.build().await.expect("first build");
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, BuildError::AlreadyBuilt));
    }

    #[tokio::test]
    async fn disabled_framework_is_an_error() {
        let mut b = builder();
        b.add_test_framework(|| Arc::new(ScriptedFramework::new().disabled()));
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, BuildError::NoEnabledFramework));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = HostConfig::default();
        config.execution.parallelism = Some(0);
        let mut b = TestApplicationBuilder::new(config);
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()));
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[tokio::test]
    async fn unknown_option_is_rejected() {
        let mut b = builder().options(ParsedOptions::parse(&["nope"]));
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()));
        let err = b.build().await.unwrap_err();
        assert!(matches!(err, BuildError::UnknownOption(name) if name == "nope"));
    }

    #[tokio::test]
    async fn composite_registered_twice_is_one_consumer() {
        let composite = CompositeExtensionFactory::new(|| RecordingConsumer::new("dual", [MessageKind::TestNodeUpdate]));
        let mut b = builder();
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()))
            .add_composite_data_consumer(&composite)
            .add_composite_data_consumer(&composite);
        assert!(!composite.is_instantiated());

        let app = b.build().await.expect("build");
        assert!(composite.is_instantiated());
        assert_eq!(app.extensions().consumers.len(), 1);
        assert_eq!(composite.get().enablement_calls(), 1);
    }

    #[tokio::test]
    async fn disabled_handler_is_excluded() {
        let mut b = builder();
        b.add_test_framework(|| Arc::new(ScriptedFramework::new()))
            .add_session_lifetime_handler(|| Arc::new(RecordingSessionHandler::new("off").disabled()))
            .add_session_lifetime_handler(|| Arc::new(RecordingSessionHandler::new("on")));
        let app = b.build().await.expect("build");
        assert_eq!(app.extensions().session_handlers.len(), 1);
        assert_eq!(app.extensions().disabled.len(), 1);
    }
}
