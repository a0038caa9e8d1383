//! Extension SDK for the testhost platform.
//!
//! # Crate Architecture
//!
//! This crate is part of the **Extension SDK** layer:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Extension SDK Layer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-types     : IDs, ErrorCode, ExitCode              │
//! │  testhost-message   : TestNode, Message, MessageKind        │
//! │  testhost-extension : Extension traits, Capability  ◄ HERE  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Extension Architecture Overview
//!
//! Extensions are independently authored values the host composes at
//! startup without knowing their concrete types:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          TestApplication                             │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌──────────────────┐   │
//! │  │ TestFramework│──►│ ExecutionCoordinator│──►│    MessageBus    │   │
//! │  └──────────────┘   └─────────────────────┘   └────────┬─────────┘   │
//! └────────────────────────────────────────────────────────┼─────────────┘
//!                                ┌─────────────────────────┼──────────┐
//!                                ▼                         ▼          ▼
//!                          ┌────────────┐           ┌────────────┐  ┌─────┐
//!                          │DataConsumer│           │DataConsumer│  │ ... │
//!                          └────────────┘           └────────────┘  └─────┘
//! ```
//!
//! # Roles
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Extension`] | Identity, metadata, enablement (all roles) |
//! | [`TestFramework`] | Discovers and executes tests |
//! | [`DataProducer`] | Declares the message kinds it publishes |
//! | [`DataConsumer`] | Declares accepted kinds and consumes messages |
//! | [`TestSessionLifetimeHandler`] | Hooks around each session |
//! | [`ProcessLifetimeHandler`] | Hooks around a launched test host |
//! | [`EnvironmentVariableProvider`] | Edits a launched host's environment |
//! | [`CommandLineOptionsProvider`] | Contributes `--option` values |
//!
//! Optional behaviours are advertised as [`Capabilities`], a closed set
//! queried with typed lookups.
//!
//! # Enablement
//!
//! [`Extension::is_enabled`] is evaluated once per identity, concurrently,
//! before the bus is wired. A disabled extension never receives a
//! `consume` call and none of its hooks run.

mod capability;
mod consumer;
mod environment;
mod error;
mod extension;
mod framework;
mod lifetime;
mod options;
pub mod testing;

pub use capability::{Capabilities, Capability, CapabilityKind};
pub use consumer::{DataConsumer, DataProducer, MessagePublisher};
pub use environment::{EnvironmentVariable, EnvironmentVariableProvider, EnvironmentVariables};
pub use error::ExtensionError;
pub use extension::{same_instance, Extension};
pub use framework::{
    DiscoveryContext, SkipMarker, TestCase, TestFailure, TestFilter, TestFramework,
};
pub use lifetime::{ProcessLifetimeHandler, ProcessLifetimeRecord, TestSessionLifetimeHandler};
pub use options::{ArgumentArity, CommandLineOption, CommandLineOptionsProvider, ParsedOptions};

// Re-exported so extension authors need a single dependency.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
