//! Test host application layer.
//!
//! This crate provides:
//!
//! - **Composition**: [`TestApplicationBuilder`] turns registrations into a
//!   runnable [`TestApplication`]
//! - **Out-of-process hosting**: [`TestHostController`] supervises a child
//!   test host over IPC
//! - **Errors**: [`AppError`] / [`BuildError`] with exit-code mapping
//! - **Re-exports**: convenient access to the lower crates
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Extension SDK Layer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-types, testhost-message, testhost-extension       │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Runtime Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-runtime (registry, bus, execution, session, ipc)  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Application Layer  ◄── HERE                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-app (builder, controller, AppError)               │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Frontend Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-cli (clap, tracing setup, exit code)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Handling Strategy
//!
//! ```text
//! Internal Errors (SessionError, IpcError, ProcessError, ...)
//!                    ↓ From impl
//!               AppError (this crate)
//!                    ↓ exit_code()
//!               ExitCode → process exit status
//! ```

mod app;
mod cli_overrides;
mod controller;
mod error;
mod options;

pub use app::{ApplicationProducer, ClientSlot, ResultForwarder, TestApplication, TestApplicationBuilder};
pub use cli_overrides::CliOverrides;
pub use controller::{ControllerOutcome, ControllerProducer, TestHostController, PIPE_NAME_VAR};
pub use error::{AppError, BuildError};

// Re-export from Extension SDK Layer
pub use testhost_extension::{
    async_trait, Capabilities, Capability, CapabilityKind, CommandLineOption,
    CommandLineOptionsProvider, DataConsumer, DataProducer, EnvironmentVariableProvider,
    Extension, ExtensionError, ParsedOptions, ProcessLifetimeHandler, TestCase, TestFailure,
    TestFilter, TestFramework, TestSessionLifetimeHandler,
};
pub use testhost_message::{Message, MessageKind, TestNodeState, TestNodeUpdate};
pub use testhost_types::{ErrorCode, ExitCode, ExtensionId, SessionUid, TestNodeUid};

// Re-export from Runtime Layer
pub use testhost_runtime::{
    CompositeExtensionFactory, ConfigLoader, ConfigResolver, HostConfig, SessionRequest,
};
pub use testhost_runtime::process::ProcessSpec;
pub use tokio_util::sync::CancellationToken;
