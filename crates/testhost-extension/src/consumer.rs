//! Producer and consumer roles of the Message Bus.
//!
//! Both sides declare the exact set of [`MessageKind`]s they touch. The bus
//! refuses to publish a kind the producer did not declare and only hands a
//! message to consumers whose declared set contains its kind.
//!
//! ```text
//! DataProducer::produced_kinds()  ─┐
//!                                  ├─► MessageBus validates + routes
//! DataConsumer::consumed_kinds()  ─┘
//! ```

use crate::{Extension, ExtensionError};
use async_trait::async_trait;
use testhost_message::{Message, MessageKind};
use testhost_types::ExtensionId;

/// Something that publishes messages.
pub trait DataProducer: Extension {
    /// Kinds this producer may publish.
    fn produced_kinds(&self) -> Vec<MessageKind>;
}

/// Something that receives messages.
///
/// `consume` runs on the consumer's own delivery task, never concurrently
/// with itself. An error is logged by the bus and does not affect delivery
/// to other consumers.
#[async_trait]
pub trait DataConsumer: Extension {
    /// Kinds this consumer accepts.
    fn consumed_kinds(&self) -> Vec<MessageKind>;

    /// Handles one message.
    async fn consume(&self, producer: &ExtensionId, message: &Message) -> Result<(), ExtensionError>;
}

/// Publishing side of the bus, handed to extensions that emit messages
/// outside the coordinator (for example crash-dump collection).
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `message` on behalf of `producer`.
    async fn publish(&self, producer: &dyn DataProducer, message: Message) -> Result<(), ExtensionError>;
}
