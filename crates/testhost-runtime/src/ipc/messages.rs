//! Request and reply records exchanged between a test host and its
//! controller.
//!
//! | Id | Message | Direction |
//! |----|---------|-----------|
//! | 1 | [`ModuleInfoRequest`] | host → controller |
//! | 2 | [`ModuleInfoReply`] | controller → host |
//! | 3 | [`VoidReply`] | controller → host |
//! | 4 | [`TestHostPidRequest`] | host → controller |
//! | 5 | [`TestResultsRequest`] | host → controller |
//! | 6 | [`SessionSummaryRequest`] | host → controller |
//! | 7 | [`TestHostExitRequest`] | host → controller |

use crate::execution::RunSummary;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use testhost_message::TestNode;
use testhost_types::SessionUid;

/// Protocol version exchanged in the handshake. Peers must agree on the
/// major component.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// A record with a fixed serializer id.
pub trait IpcMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Serializer id written in the frame header.
    const TYPE_ID: u16;
    /// Name used in diagnostics.
    const NAME: &'static str;
}

macro_rules! ipc_message {
    ($ty:ident, $id:expr) => {
        impl IpcMessage for $ty {
            const TYPE_ID: u16 = $id;
            const NAME: &'static str = stringify!($ty);
        }
    };
}

/// First message on every connection: who the host is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfoRequest {
    pub protocol_version: String,
    /// Path of the test module the host runs.
    pub module_path: String,
    pub host_version: String,
}

impl ModuleInfoRequest {
    #[must_use]
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            module_path: module_path.into(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Controller's answer to the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfoReply {
    pub protocol_version: String,
}

impl Default for ModuleInfoReply {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Acknowledgement without content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidReply {}

/// Host reports its process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestHostPidRequest {
    pub pid: u32,
}

/// Host relays terminal test results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultsRequest {
    pub session_uid: SessionUid,
    pub nodes: Vec<TestNode>,
}

/// Host reports the outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummaryRequest {
    pub session_uid: SessionUid,
    pub summary: RunSummary,
}

/// Host announces it is about to exit. A host that exits without sending
/// this exited ungracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestHostExitRequest {
    pub exit_code: i32,
}

ipc_message!(ModuleInfoRequest, 1);
ipc_message!(ModuleInfoReply, 2);
ipc_message!(VoidReply, 3);
ipc_message!(TestHostPidRequest, 4);
ipc_message!(TestResultsRequest, 5);
ipc_message!(SessionSummaryRequest, 6);
ipc_message!(TestHostExitRequest, 7);

/// Any request a controller can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcRequest {
    ModuleInfo(ModuleInfoRequest),
    TestHostPid(TestHostPidRequest),
    TestResults(TestResultsRequest),
    SessionSummary(SessionSummaryRequest),
    TestHostExit(TestHostExitRequest),
}

impl IpcRequest {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModuleInfo(_) => ModuleInfoRequest::NAME,
            Self::TestHostPid(_) => TestHostPidRequest::NAME,
            Self::TestResults(_) => TestResultsRequest::NAME,
            Self::SessionSummary(_) => SessionSummaryRequest::NAME,
            Self::TestHostExit(_) => TestHostExitRequest::NAME,
        }
    }
}

/// Any reply a controller can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcReply {
    ModuleInfo(ModuleInfoReply),
    Void(VoidReply),
}

/// Returns `true` when both versions share the major component.
#[must_use]
pub fn protocol_compatible(local: &str, remote: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    major(local).is_some() && major(local) == major(remote)
}
