//! Message types for the testhost Message Bus.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Extension SDK Layer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-types     : IDs, ErrorCode, ExitCode              │
//! │  testhost-message   : TestNode, Message, MessageKind ◄ HERE │
//! │  testhost-extension : Extension traits, Capability          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Message Flow
//!
//! ```text
//! ┌──────────────────┐  publish(producer, Message)  ┌───────────────┐
//! │ Coordinator      │ ───────────────────────────► │  MessageBus   │
//! │ Crash-dump glue  │                              │ (route by     │
//! │ Extensions       │                              │  MessageKind) │
//! └──────────────────┘                              └───────┬───────┘
//!                                   ┌───────────────────────┼──────────────┐
//!                                   ▼                       ▼              ▼
//!                            ┌────────────┐          ┌────────────┐  ┌────────────┐
//!                            │ Console    │          │ TRX        │  │ Controller │
//!                            │ reporter   │          │ reporter   │  │ relay      │
//!                            └────────────┘          └────────────┘  └────────────┘
//! ```
//!
//! Every payload is serde-serializable so the same types travel over the
//! IPC channel between a host and its controller.

mod kind;
mod message;
mod node;

pub use kind::MessageKind;
pub use message::{
    CustomMessage, FileArtifact, Message, SessionArtifact, TelemetryEvent, TestNodeUpdate,
};
pub use node::{ExceptionInfo, TestNode, TestNodeState};
