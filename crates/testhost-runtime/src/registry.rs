//! Extension registry.
//!
//! Registration stores factories, never instances. [`ExtensionRegistry::resolve`]
//! instantiates everything once, checks identities and evaluates enablement:
//!
//! ```text
//! add_*(factory) × N
//!        │
//!        ▼ resolve()
//! ┌───────────────────────────────────────────────────────────┐
//! │ 1. instantiate every factory                              │
//! │ 2. one ExtensionId ⇒ one instance  (else Duplicate)       │
//! │ 3. is_enabled() once per ExtensionId, concurrently         │
//! │ 4. drop disabled extensions from every role               │
//! └───────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//! ResolvedExtensions (immutable)
//! ```
//!
//! # Composite factories
//!
//! One concrete type can serve several roles. Registering it through a
//! [`CompositeExtensionFactory`] under each role yields a single shared
//! instance, so its enablement predicate and side effects run once.
//!
//! ```
//! use std::sync::Arc;
//! use testhost_extension::testing::RecordingSessionHandler;
//! use testhost_extension::TestSessionLifetimeHandler;
//! use testhost_runtime::registry::CompositeExtensionFactory;
//!
//! let factory = CompositeExtensionFactory::new(|| RecordingSessionHandler::new("h"));
//! let a: Arc<dyn TestSessionLifetimeHandler> = factory.get();
//! let b = factory.get();
//! assert!(Arc::ptr_eq(&factory.get(), &b));
//! assert!(factory.is_instantiated());
//! # drop(a);
//! ```

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use testhost_extension::{
    same_instance, CommandLineOptionsProvider, DataConsumer, DataProducer,
    EnvironmentVariableProvider, Extension, ProcessLifetimeHandler, TestFramework,
    TestSessionLifetimeHandler,
};
use testhost_types::{ErrorCode, ExtensionId};
use thiserror::Error;
use tracing::{debug, info};

/// Registry error.
///
/// | Variant | Code |
/// |---------|------|
/// | [`DuplicateExtension`](RegistryError::DuplicateExtension) | `REGISTRY_DUPLICATE_EXTENSION` |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two distinct instances report the same identity.
    #[error("two distinct extensions share the identity {0}")]
    DuplicateExtension(ExtensionId),
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateExtension(_) => "REGISTRY_DUPLICATE_EXTENSION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Builds a value once and shares it across every role it is registered in.
pub struct CompositeExtensionFactory<T> {
    create: Box<dyn Fn() -> T + Send + Sync>,
    instance: OnceLock<Arc<T>>,
}

impl<T: Send + Sync + 'static> CompositeExtensionFactory<T> {
    /// Wraps `create`. Nothing is constructed until [`get`](Self::get).
    #[must_use]
    pub fn new(create: impl Fn() -> T + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            create: Box::new(create),
            instance: OnceLock::new(),
        })
    }

    /// Returns the shared instance, constructing it on first use.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(self.instance.get_or_init(|| Arc::new((self.create)())))
    }

    /// Returns `true` once the instance exists.
    #[must_use]
    pub fn is_instantiated(&self) -> bool {
        self.instance.get().is_some()
    }
}

type Factory<T> = Box<dyn FnOnce() -> Arc<T> + Send>;

/// Deferred registrations, grouped by role.
#[derive(Default)]
pub struct ExtensionRegistry {
    frameworks: Vec<Factory<dyn TestFramework>>,
    producers: Vec<Factory<dyn DataProducer>>,
    consumers: Vec<Factory<dyn DataConsumer>>,
    session_handlers: Vec<Factory<dyn TestSessionLifetimeHandler>>,
    process_handlers: Vec<Factory<dyn ProcessLifetimeHandler>>,
    env_providers: Vec<Factory<dyn EnvironmentVariableProvider>>,
    option_providers: Vec<Factory<dyn CommandLineOptionsProvider>>,
}

macro_rules! role_registration {
    ($add:ident, $count:ident, $field:ident, $role:path) => {
        #[doc = concat!("Registers a `", stringify!($role), "` factory.")]
        pub fn $add(&mut self, factory: impl FnOnce() -> Arc<dyn $role> + Send + 'static) {
            self.$field.push(Box::new(factory));
        }

        #[doc = concat!("Number of `", stringify!($role), "` registrations.")]
        #[must_use]
        pub fn $count(&self) -> usize {
            self.$field.len()
        }
    };
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    role_registration!(add_framework, framework_count, frameworks, TestFramework);
    role_registration!(add_producer, producer_count, producers, DataProducer);
    role_registration!(add_consumer, consumer_count, consumers, DataConsumer);
    role_registration!(
        add_session_handler,
        session_handler_count,
        session_handlers,
        TestSessionLifetimeHandler
    );
    role_registration!(
        add_process_handler,
        process_handler_count,
        process_handlers,
        ProcessLifetimeHandler
    );
    role_registration!(
        add_environment_provider,
        environment_provider_count,
        env_providers,
        EnvironmentVariableProvider
    );
    role_registration!(
        add_options_provider,
        options_provider_count,
        option_providers,
        CommandLineOptionsProvider
    );

    /// Instantiates, checks identities and filters by enablement.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateExtension`] when two distinct instances
    /// report the same [`ExtensionId`].
    pub async fn resolve(self) -> Result<ResolvedExtensions, RegistryError> {
        let frameworks = instantiate(self.frameworks);
        let producers = instantiate(self.producers);
        let consumers = instantiate(self.consumers);
        let session_handlers = instantiate(self.session_handlers);
        let process_handlers = instantiate(self.process_handlers);
        let env_providers = instantiate(self.env_providers);
        let option_providers = instantiate(self.option_providers);

        let mut gate = EnablementGate::default();
        gate.collect(&frameworks)?;
        gate.collect(&producers)?;
        gate.collect(&consumers)?;
        gate.collect(&session_handlers)?;
        gate.collect(&process_handlers)?;
        gate.collect(&env_providers)?;
        gate.collect(&option_providers)?;

        let enabled = gate.evaluate().await;
        let is_enabled = |id: &ExtensionId| enabled.get(id).copied().unwrap_or(false);

        let mut disabled: Vec<ExtensionId> = enabled
            .iter()
            .filter(|(_, on)| !**on)
            .map(|(id, _)| id.clone())
            .collect();
        disabled.sort();
        for id in &disabled {
            info!(extension = %id, "Extension disabled");
        }

        Ok(ResolvedExtensions {
            frameworks: retain_enabled(frameworks, &is_enabled),
            producers: retain_enabled(producers, &is_enabled),
            consumers: retain_enabled(consumers, &is_enabled),
            session_handlers: retain_enabled(session_handlers, &is_enabled),
            process_handlers: retain_enabled(process_handlers, &is_enabled),
            env_providers: retain_enabled(env_providers, &is_enabled),
            option_providers: retain_enabled(option_providers, &is_enabled),
            disabled,
        })
    }
}

fn instantiate<T: ?Sized>(factories: Vec<Factory<T>>) -> Vec<Arc<T>> {
    factories.into_iter().map(|f| f()).collect()
}

fn retain_enabled<T: Extension + ?Sized>(
    items: Vec<Arc<T>>,
    is_enabled: &impl Fn(&ExtensionId) -> bool,
) -> Vec<Arc<T>> {
    let mut kept: Vec<Arc<T>> = Vec::with_capacity(items.len());
    for item in items {
        if is_enabled(item.uid()) && !kept.iter().any(|k| same_address(k, &item)) {
            kept.push(item);
        }
    }
    kept
}

fn same_address<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// One enablement future per identity.
#[derive(Default)]
struct EnablementGate {
    /// Identity -> address of the instance that claimed it.
    owners: HashMap<ExtensionId, usize>,
    pending: Vec<(ExtensionId, BoxFuture<'static, bool>)>,
}

impl EnablementGate {
    fn collect<T: Extension + ?Sized + 'static>(
        &mut self,
        items: &[Arc<T>],
    ) -> Result<(), RegistryError> {
        for item in items {
            let id = item.uid().clone();
            let address = Arc::as_ptr(item).cast::<()>() as usize;
            match self.owners.get(&id) {
                Some(&owner) if owner == address => continue,
                Some(_) => return Err(RegistryError::DuplicateExtension(id)),
                None => {
                    self.owners.insert(id.clone(), address);
                    let ext = Arc::clone(item);
                    self.pending
                        .push((id, Box::pin(async move { ext.is_enabled().await })));
                }
            }
        }
        Ok(())
    }

    async fn evaluate(self) -> HashMap<ExtensionId, bool> {
        let (ids, futures): (Vec<_>, Vec<_>) = self.pending.into_iter().unzip();
        let results = futures::future::join_all(futures).await;
        debug!(extensions = ids.len(), "Evaluated extension enablement");
        ids.into_iter().zip(results).collect()
    }
}

/// Enabled extensions per role, fixed for the rest of the process.
#[derive(Clone, Default)]
pub struct ResolvedExtensions {
    pub frameworks: Vec<Arc<dyn TestFramework>>,
    pub producers: Vec<Arc<dyn DataProducer>>,
    pub consumers: Vec<Arc<dyn DataConsumer>>,
    pub session_handlers: Vec<Arc<dyn TestSessionLifetimeHandler>>,
    pub process_handlers: Vec<Arc<dyn ProcessLifetimeHandler>>,
    pub env_providers: Vec<Arc<dyn EnvironmentVariableProvider>>,
    pub option_providers: Vec<Arc<dyn CommandLineOptionsProvider>>,
    /// Identities whose predicate returned `false`.
    pub disabled: Vec<ExtensionId>,
}

impl ResolvedExtensions {
    /// The enabled test framework, if exactly one is left.
    #[must_use]
    pub fn framework(&self) -> Option<&Arc<dyn TestFramework>> {
        match self.frameworks.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Returns `true` if `id` was registered and turned out disabled.
    #[must_use]
    pub fn is_disabled(&self, id: &ExtensionId) -> bool {
        self.disabled.contains(id)
    }

    /// Returns `true` if the consumer list holds `instance`.
    #[must_use]
    pub fn has_consumer<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
        self.consumers.iter().any(|c| same_instance(c, instance))
    }
}
