//! Core types for the testhost platform.
//!
//! This crate is the bottom of the extension SDK: identifiers, the
//! [`ErrorCode`] trait every layer implements, and the closed
//! [`ExitCode`] enumeration shared by the host and its controller.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Extension SDK Layer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  testhost-types     : IDs, ErrorCode, ExitCode  ◄── HERE     │
//! │  testhost-message   : TestNode, Message, MessageKind        │
//! │  testhost-extension : Extension traits, Capability          │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  testhost-runtime   : registry, bus, coordinator, IPC       │
//! │  testhost-app       : builder, application, controller      │
//! │  testhost-cli       : `testhost` binary                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use testhost_types::{ExitCode, ExtensionId, SessionUid, TestNodeUid};
//!
//! let framework = ExtensionId::new("framework", "manifest");
//! let session = SessionUid::new();
//! let test = TestNodeUid::new("suite::case");
//!
//! assert_eq!(framework.fqn(), "framework::manifest");
//! assert!(session.to_string().starts_with("session:"));
//! assert_eq!(test.as_str(), "suite::case");
//! assert_eq!(ExitCode::classify(0), ExitCode::Success);
//! ```

mod error;
mod exit_code;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use exit_code::{ExitCode, UnknownExitCode};
pub use id::{ExtensionId, RequestId, SessionUid, TestNodeUid};
