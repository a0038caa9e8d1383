//! testhost runtime - internal implementation layer.
//!
//! This crate wires extensions together and drives test sessions. It is
//! NOT part of the Extension SDK; extensions depend on
//! `testhost-extension` only.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Extension SDK Layer                       │
//! │  testhost-types / testhost-message / testhost-extension      │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Runtime Layer (THIS CRATE)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  registry/  : factories, composite instantiation, enablement │
//! │  bus/       : typed pub/sub with per-consumer queues         │
//! │  execution/ : gate, classification, report, coordinator      │
//! │  session/   : Created → Executing → Finishing → Closed       │
//! │  ipc/       : framed request/reply with handshake            │
//! │  process/   : launcher, crash dumps, hang detection          │
//! │  config/    : layered HostConfig                             │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Application Layer                          │
//! │  testhost-app: builder, TestApplication, controller          │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Frontend Layer                             │
//! │  testhost-cli                                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! One [`CancellationToken`](tokio_util::sync::CancellationToken) is
//! threaded through session creation, the coordinator and IPC calls. Per
//! test and per request timeouts are child tokens (see [`deadline`]), so a
//! timeout and an explicit cancellation stay distinguishable.

pub mod bus;
pub mod config;
pub mod deadline;
pub mod execution;
pub mod ipc;
pub mod process;
pub mod registry;
pub mod session;

pub use bus::{BusError, MessageBus, MessageBusBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResolver, HostConfig, NoOpResolver};
pub use deadline::{Deadline, DeadlineError};
pub use execution::{CoordinatorOptions, ExecutionCoordinator, RunSummary};
pub use ipc::{IpcClient, IpcError, IpcServer, SerializerRegistry};
pub use process::{CrashDumpHandler, HangMonitor, ProcessError, ProcessLauncher};
pub use registry::{
    CompositeExtensionFactory, ExtensionRegistry, RegistryError, ResolvedExtensions,
};
pub use session::{SessionContext, SessionError, SessionOutcome, SessionRequest, TestSession};
