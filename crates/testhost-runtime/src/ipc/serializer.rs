//! Serializer registry.
//!
//! Every message type is bound to exactly one serializer id before first
//! use. Encoding a type that was never registered is a programming error
//! and fails before any byte reaches the transport.

use super::frame::Frame;
use super::messages::{
    IpcMessage, IpcReply, IpcRequest, ModuleInfoReply, ModuleInfoRequest, SessionSummaryRequest,
    TestHostExitRequest, TestHostPidRequest, TestResultsRequest, VoidReply,
};
use super::IpcError;
use std::any::TypeId;
use std::collections::HashMap;

/// Maps message types to serializer ids and back.
#[derive(Debug, Default, Clone)]
pub struct SerializerRegistry {
    by_type: HashMap<TypeId, u16>,
    by_id: HashMap<u16, &'static str>,
}

impl SerializerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every protocol message registered.
    #[must_use]
    pub fn with_protocol() -> Self {
        let mut registry = Self::new();
        registry.insert::<ModuleInfoRequest>();
        registry.insert::<ModuleInfoReply>();
        registry.insert::<VoidReply>();
        registry.insert::<TestHostPidRequest>();
        registry.insert::<TestResultsRequest>();
        registry.insert::<SessionSummaryRequest>();
        registry.insert::<TestHostExitRequest>();
        registry
    }

    fn insert<M: IpcMessage>(&mut self) {
        self.by_type.insert(TypeId::of::<M>(), M::TYPE_ID);
        self.by_id.insert(M::TYPE_ID, M::NAME);
    }

    /// Binds `M` to its serializer id.
    ///
    /// # Errors
    ///
    /// [`IpcError::DuplicateSerializer`] if another type holds the id.
    pub fn register<M: IpcMessage>(&mut self) -> Result<(), IpcError> {
        match self.by_id.get(&M::TYPE_ID) {
            Some(&existing) if existing != M::NAME => Err(IpcError::DuplicateSerializer {
                id: M::TYPE_ID,
                existing,
            }),
            _ => {
                self.insert::<M>();
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_registered<M: IpcMessage>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<M>())
    }

    /// Name registered for `id`.
    #[must_use]
    pub fn name_of(&self, id: u16) -> Option<&'static str> {
        self.by_id.get(&id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Encodes `message` into a frame.
    ///
    /// # Errors
    ///
    /// [`IpcError::UnregisteredType`] or [`IpcError::Serialization`].
    pub fn encode<M: IpcMessage>(&self, message: &M) -> Result<Frame, IpcError> {
        let id = self
            .by_type
            .get(&TypeId::of::<M>())
            .copied()
            .ok_or(IpcError::UnregisteredType(M::NAME))?;
        Ok(Frame::new(id, serde_json::to_vec(message)?))
    }

    /// Decodes a frame that must carry `M`.
    ///
    /// # Errors
    ///
    /// [`IpcError::UnregisteredType`], [`IpcError::UnexpectedMessage`] or
    /// [`IpcError::Serialization`].
    pub fn decode<M: IpcMessage>(&self, frame: &Frame) -> Result<M, IpcError> {
        if !self.is_registered::<M>() {
            return Err(IpcError::UnregisteredType(M::NAME));
        }
        if frame.serializer_id != M::TYPE_ID {
            return Err(IpcError::UnexpectedMessage {
                expected: M::NAME,
                actual: frame.serializer_id,
            });
        }
        Ok(serde_json::from_slice(&frame.body)?)
    }

    /// Decodes any request by its serializer id.
    ///
    /// # Errors
    ///
    /// [`IpcError::UnknownSerializer`] for ids that are not requests.
    pub fn decode_request(&self, frame: &Frame) -> Result<IpcRequest, IpcError> {
        match frame.serializer_id {
            ModuleInfoRequest::TYPE_ID => self.decode(frame).map(IpcRequest::ModuleInfo),
            TestHostPidRequest::TYPE_ID => self.decode(frame).map(IpcRequest::TestHostPid),
            TestResultsRequest::TYPE_ID => self.decode(frame).map(IpcRequest::TestResults),
            SessionSummaryRequest::TYPE_ID => self.decode(frame).map(IpcRequest::SessionSummary),
            TestHostExitRequest::TYPE_ID => self.decode(frame).map(IpcRequest::TestHostExit),
            other => Err(IpcError::UnknownSerializer(other)),
        }
    }

    /// Encodes any reply.
    ///
    /// # Errors
    ///
    /// See [`encode`](Self::encode).
    pub fn encode_reply(&self, reply: &IpcReply) -> Result<Frame, IpcError> {
        match reply {
            IpcReply::ModuleInfo(reply) => self.encode(reply),
            IpcReply::Void(reply) => self.encode(reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Rogue;

    impl IpcMessage for Rogue {
        const TYPE_ID: u16 = 1;
        const NAME: &'static str = "Rogue";
    }

    #[test]
    fn protocol_registry_has_all_messages() {
        let registry = SerializerRegistry::with_protocol();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.name_of(6), Some("SessionSummaryRequest"));
    }

    #[test]
    fn unregistered_type_is_rejected() {
        let registry = SerializerRegistry::new();
        assert_eq!(
            registry.encode(&VoidReply {}).unwrap_err(),
            IpcError::UnregisteredType("VoidReply")
        );
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = SerializerRegistry::with_protocol();
        assert!(registry.register::<ModuleInfoRequest>().is_ok());
        assert_eq!(
            registry.register::<Rogue>().unwrap_err(),
            IpcError::DuplicateSerializer {
                id: 1,
                existing: "ModuleInfoRequest"
            }
        );
    }

    #[test]
    fn wrong_reply_type_is_reported() {
        let registry = SerializerRegistry::with_protocol();
        let frame = registry.encode(&VoidReply {}).expect("encode");
        assert_eq!(
            registry.decode::<ModuleInfoReply>(&frame).unwrap_err(),
            IpcError::UnexpectedMessage {
                expected: "ModuleInfoReply",
                actual: 3
            }
        );
    }

    #[test]
    fn requests_decode_by_id() {
        let registry = SerializerRegistry::with_protocol();
        let frame = registry
            .encode(&TestHostExitRequest { exit_code: 2 })
            .expect("encode");
        assert_eq!(
            registry.decode_request(&frame).expect("decode"),
            IpcRequest::TestHostExit(TestHostExitRequest { exit_code: 2 })
        );

        let reply = registry.encode(&VoidReply {}).expect("encode");
        assert_eq!(
            registry.decode_request(&reply).unwrap_err(),
            IpcError::UnknownSerializer(3)
        );
    }
}
