//! Child mode: reporting to a controlling process.
//!
//! When the host was launched by a [`TestHostController`](crate::TestHostController)
//! it connects to the controller's pipe before the session starts and
//! relays everything the controller needs:
//!
//! ```text
//! connect ─► ModuleInfoRequest ─► TestHostPidRequest
//!    │
//!    │   session runs; ResultForwarder sends one TestResultsRequest
//!    │   per terminal node update
//!    ▼
//! SessionSummaryRequest ─► TestHostExitRequest ─► exit
//! ```
//!
//! The forwarder is wired into the bus at build time, before the
//! connection exists. It holds a [`ClientSlot`] that is filled once the
//! handshake succeeded; updates that arrive while the slot is empty are
//! dropped with a warning.

use parking_lot::Mutex;
use std::sync::Arc;
use testhost_extension::{async_trait, DataConsumer, Extension, ExtensionError};
use testhost_message::{Message, MessageKind};
use testhost_runtime::ipc::{
    ClientOptions, SessionSummaryRequest, TestHostExitRequest, TestHostPidRequest,
    TestResultsRequest, VoidReply,
};
use testhost_runtime::{HostConfig, IpcClient, IpcError, RunSummary, SerializerRegistry};
use testhost_types::{ExtensionId, SessionUid};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared slot holding the connected client, if any, with the run's
/// cancellation token.
#[derive(Clone, Default)]
pub struct ClientSlot {
    inner: Arc<Mutex<Option<(Arc<IpcClient>, CancellationToken)>>>,
}

impl ClientSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, client: Arc<IpcClient>, cancel: CancellationToken) {
        *self.inner.lock() = Some((client, cancel));
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }

    #[must_use]
    pub fn get(&self) -> Option<(Arc<IpcClient>, CancellationToken)> {
        self.inner.lock().clone()
    }
}

/// Forwards terminal test results to the controller.
pub struct ResultForwarder {
    id: ExtensionId,
    slot: ClientSlot,
}

impl ResultForwarder {
    #[must_use]
    pub fn new(slot: ClientSlot) -> Self {
        Self {
            id: ExtensionId::builtin("ipc-result-forwarder"),
            slot,
        }
    }
}

#[async_trait]
impl Extension for ResultForwarder {
    fn uid(&self) -> &ExtensionId {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Controller result forwarder"
    }
}

#[async_trait]
impl DataConsumer for ResultForwarder {
    fn consumed_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::TestNodeUpdate]
    }

    async fn consume(&self, _producer: &ExtensionId, message: &Message) -> Result<(), ExtensionError> {
        let Some(update) = message.as_node_update() else {
            return Ok(());
        };
        if !update.node.state.is_terminal() {
            return Ok(());
        }
        let Some((client, cancel)) = self.slot.get() else {
            warn!(test = %update.node.uid, "No controller connection, result not forwarded");
            return Ok(());
        };

        let request = TestResultsRequest {
            session_uid: update.session_uid,
            nodes: vec![update.node.clone()],
        };
        client
            .request::<_, VoidReply>(&request, &cancel)
            .await
            .map(|_| ())
            .map_err(|e| ExtensionError::failed(format!("forwarding result failed: {}", e)))
    }
}

/// Connection to the controller for one run.
pub(crate) struct ControllerLink {
    client: Arc<IpcClient>,
    slot: ClientSlot,
}

impl ControllerLink {
    /// Connects, performs the handshake and reports the process id.
    ///
    /// # Errors
    ///
    /// Any [`IpcError`]; [`IpcError::IncompatibleProtocol`] when the
    /// controller speaks another major protocol version.
    pub(crate) async fn open(
        pipe_name: &str,
        config: &HostConfig,
        slot: ClientSlot,
        cancel: &CancellationToken,
    ) -> Result<Self, IpcError> {
        let options = ClientOptions {
            connect_timeout: config.ipc.connect_timeout(),
            request_timeout: config.ipc.request_timeout(),
        };
        let registry = Arc::new(SerializerRegistry::with_protocol());
        let client = Arc::new(IpcClient::connect(pipe_name, registry, options, cancel).await?);

        let module = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let reply = client.handshake(&module, cancel).await?;
        let _: VoidReply = client
            .request(&TestHostPidRequest { pid: std::process::id() }, cancel)
            .await?;

        info!(pipe = pipe_name, protocol = %reply.protocol_version, "Connected to controller");
        slot.set(Arc::clone(&client), cancel.clone());
        Ok(Self { client, slot })
    }

    pub(crate) async fn report_summary(
        &self,
        session_uid: SessionUid,
        summary: &RunSummary,
        cancel: &CancellationToken,
    ) -> Result<(), IpcError> {
        let request = SessionSummaryRequest {
            session_uid,
            summary: summary.clone(),
        };
        let _: VoidReply = self.client.request(&request, cancel).await?;
        Ok(())
    }

    /// Announces the exit and drops the connection.
    pub(crate) async fn close(self, exit_code: i32, cancel: &CancellationToken) -> Result<(), IpcError> {
        self.slot.clear();
        let _: VoidReply = self
            .client
            .request(&TestHostExitRequest { exit_code }, cancel)
            .await?;
        debug!(exit_code, "Exit announced to controller");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_message::{TestNode, TestNodeState, TestNodeUpdate};
    use testhost_runtime::ipc::frame::read_frame;
    use testhost_runtime::ipc::IpcRequest;
    use testhost_types::TestNodeUid;

    fn update(state: TestNodeState) -> Message {
        Message::TestNodeUpdate(TestNodeUpdate {
            session_uid: SessionUid::new(),
            node: TestNode::discovered(TestNodeUid::new("a"), "a").with_state(state),
        })
    }

    #[test]
    fn slot_set_and_clear() {
        let slot = ClientSlot::new();
        assert!(slot.get().is_none());

        let (stream, _peer) = tokio::io::duplex(64);
        let client = Arc::new(IpcClient::from_stream(
            stream,
            Arc::new(SerializerRegistry::with_protocol()),
            std::time::Duration::from_secs(1),
        ));
        slot.set(client, CancellationToken::new());
        assert!(slot.clone().get().is_some());

        slot.clear();
        assert!(slot.get().is_none());
    }

    #[tokio::test]
    async fn empty_slot_drops_results() {
        let forwarder = ResultForwarder::new(ClientSlot::new());
        forwarder
            .consume(&ExtensionId::builtin("p"), &update(TestNodeState::Passed))
            .await
            .expect("dropped without error");
    }

    #[tokio::test]
    async fn forwards_terminal_updates_only() {
        let registry = Arc::new(SerializerRegistry::with_protocol());
        let (stream, mut controller) = tokio::io::duplex(1 << 16);
        let slot = ClientSlot::new();
        slot.set(
            Arc::new(IpcClient::from_stream(
                stream,
                Arc::clone(&registry),
                std::time::Duration::from_millis(200),
            )),
            CancellationToken::new(),
        );
        let forwarder = ResultForwarder::new(slot);

        forwarder
            .consume(&ExtensionId::builtin("p"), &update(TestNodeState::Discovered))
            .await
            .expect("ignored");

        // Nobody answers, so the terminal update times out after being sent.
        let err = forwarder
            .consume(&ExtensionId::builtin("p"), &update(TestNodeState::Passed))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forwarding result failed"));

        let frame = read_frame(&mut controller).await.expect("read").expect("frame");
        match registry.decode_request(&frame).expect("decode") {
            IpcRequest::TestResults(request) => {
                assert_eq!(request.nodes.len(), 1);
                assert_eq!(request.nodes[0].state, TestNodeState::Passed);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
