//! Request/reply IPC between a test host and its controller.
//!
//! # Architecture
//!
//! ```text
//!   Test host (child)                          Controller (parent)
//! ┌──────────────────┐     named channel     ┌──────────────────┐
//! │    IpcClient     │ ───── frames ───────► │  IpcConnection   │
//! │                  │ ◄──── frames ──────── │  RequestHandler  │
//! └──────────────────┘                       └──────────────────┘
//! ```
//!
//! Each message type is bound to a serializer id in a
//! [`SerializerRegistry`]; frames carry that id ahead of a JSON body (see
//! [`frame`]). The first exchange on a connection is always the
//! `ModuleInfoRequest` handshake.

mod client;
mod error;
pub mod frame;
mod messages;
mod serializer;
mod server;
mod transport;

pub use client::{ClientOptions, IpcClient};
pub use error::IpcError;
pub use frame::{Frame, MAX_FRAME_LEN};
pub use messages::{
    protocol_compatible, IpcMessage, IpcReply, IpcRequest, ModuleInfoReply, ModuleInfoRequest,
    SessionSummaryRequest, TestHostExitRequest, TestHostPidRequest, TestResultsRequest, VoidReply,
    PROTOCOL_VERSION,
};
pub use serializer::SerializerRegistry;
pub use server::{IpcConnection, IpcServer, RequestHandler};
pub use transport::{generate_pipe_name, socket_path, BoxedStream, IpcStream};
