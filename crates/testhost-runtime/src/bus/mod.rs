//! MessageBus - typed fan-out from producers to consumers.
//!
//! # Routing
//!
//! ```text
//! ┌─────────────┐ publish(producer, msg) ┌───────────────────────────────┐
//! │  Producer   │ ─────────────────────► │ MessageBus                    │
//! │ (declares   │                        │  1. kind ∈ produced_kinds?    │
//! │  kinds)     │                        │  2. routes[kind] → consumers  │
//! └─────────────┘                        └──────────────┬────────────────┘
//!                            ┌──────────────────────────┼────────────────┐
//!                            ▼                          ▼                ▼
//!                     ┌─────────────┐           ┌─────────────┐   ┌─────────────┐
//!                     │ queue+task  │           │ queue+task  │   │ queue+task  │
//!                     │ Consumer A  │           │ Consumer B  │   │ Consumer C  │
//!                     └─────────────┘           └─────────────┘   └─────────────┘
//! ```
//!
//! Each consumer owns a bounded queue drained by its own task, so delivery
//! to one consumer never waits on another. A consumer that returns an
//! error or panics is logged and keeps receiving later messages.
//!
//! # Ordering
//!
//! Messages from one publisher to one consumer arrive in publish order.
//! There is no global order across consumers. [`MessageBus::drain`] is a
//! barrier: it returns once every message published before the call has
//! been consumed, which is what session close waits on.
//!
//! # Type Safety
//!
//! A consumer only ever receives kinds it declared. A producer publishing
//! a kind it did not declare gets [`BusError::UndeclaredMessageKind`].

mod error;

pub use error::BusError;

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use testhost_extension::{DataConsumer, DataProducer, ExtensionError, MessagePublisher};
use testhost_message::{Message, MessageKind};
use testhost_types::ExtensionId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// Default per-consumer queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum Envelope {
    Deliver {
        producer: ExtensionId,
        message: Arc<Message>,
    },
    Flush(oneshot::Sender<()>),
    Stop,
}

struct ConsumerSlot {
    id: ExtensionId,
    tx: mpsc::Sender<Envelope>,
}

struct BusInner {
    /// Kind -> indexes into `slots`.
    routes: HashMap<MessageKind, Vec<usize>>,
    slots: Vec<ConsumerSlot>,
    tracker: TaskTracker,
    closed: AtomicBool,
}

/// Builds a [`MessageBus`] from enabled consumers and producers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use testhost_extension::testing::{RecordingConsumer, StaticProducer};
/// use testhost_message::{Message, MessageKind, TelemetryEvent};
/// use testhost_runtime::bus::MessageBusBuilder;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let consumer = Arc::new(RecordingConsumer::new("rec", [MessageKind::Telemetry]));
/// let producer = StaticProducer::new("p", [MessageKind::Telemetry]);
///
/// let bus = MessageBusBuilder::new()
///     .producer(&producer)
///     .consumer(consumer.clone())
///     .build();
///
/// bus.publish(&producer, Message::Telemetry(TelemetryEvent::new("x"))).await.unwrap();
/// bus.drain().await;
/// assert_eq!(consumer.len(), 1);
/// bus.shutdown().await;
/// # });
/// ```
#[derive(Default)]
pub struct MessageBusBuilder {
    consumers: Vec<Arc<dyn DataConsumer>>,
    produced: HashSet<MessageKind>,
    queue_capacity: Option<usize>,
}

impl MessageBusBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an enabled consumer.
    #[must_use]
    pub fn consumer(mut self, consumer: Arc<dyn DataConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// Records the kinds an enabled producer emits, for build-time checks.
    #[must_use]
    pub fn producer(mut self, producer: &dyn DataProducer) -> Self {
        self.produced.extend(producer.produced_kinds());
        self
    }

    /// Records kinds emitted by a producer that is not an extension value.
    #[must_use]
    pub fn produced_kinds(mut self, kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        self.produced.extend(kinds);
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Spawns one delivery task per consumer.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn build(self) -> MessageBus {
        let capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let tracker = TaskTracker::new();
        let mut routes: HashMap<MessageKind, Vec<usize>> = HashMap::new();
        let mut slots = Vec::with_capacity(self.consumers.len());

        for consumer in self.consumers {
            let index = slots.len();
            let mut kinds = consumer.consumed_kinds();
            kinds.sort_by_key(MessageKind::name);
            kinds.dedup();

            for kind in kinds {
                if !self.produced.contains(&kind) {
                    warn!(
                        consumer = %consumer.uid(),
                        kind = %kind,
                        "Consumer declares a message kind no enabled producer emits"
                    );
                }
                routes.entry(kind).or_default().push(index);
            }

            let (tx, rx) = mpsc::channel(capacity);
            slots.push(ConsumerSlot {
                id: consumer.uid().clone(),
                tx,
            });
            tracker.spawn(deliver_loop(consumer, rx));
        }

        debug!(consumers = slots.len(), kinds = routes.len(), "Message bus started");

        MessageBus {
            inner: Arc::new(BusInner {
                routes,
                slots,
                tracker,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

/// Typed pub/sub fabric connecting producers to consumers.
///
/// Cheap to clone; clones share the same consumers and queues.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Publishes `message` on behalf of `producer`.
    ///
    /// Returns once the message is queued for every consumer that declared
    /// its kind, with the number of consumers it was queued for.
    ///
    /// # Errors
    ///
    /// - [`BusError::UndeclaredMessageKind`] if the producer did not declare the kind
    /// - [`BusError::Closed`] after [`shutdown`](Self::shutdown)
    pub async fn publish(
        &self,
        producer: &dyn DataProducer,
        message: Message,
    ) -> Result<usize, BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let kind = message.kind();
        if !producer.produced_kinds().contains(&kind) {
            return Err(BusError::UndeclaredMessageKind {
                producer: producer.uid().clone(),
                kind,
            });
        }

        let Some(targets) = self.inner.routes.get(&kind) else {
            trace!(kind = %kind, "No consumer for message kind");
            return Ok(0);
        };

        let message = Arc::new(message);
        let mut queued = 0;
        for &index in targets {
            let slot = &self.inner.slots[index];
            let envelope = Envelope::Deliver {
                producer: producer.uid().clone(),
                message: Arc::clone(&message),
            };
            if slot.tx.send(envelope).await.is_ok() {
                queued += 1;
            } else {
                warn!(consumer = %slot.id, kind = %kind, "Consumer queue closed, message dropped");
            }
        }
        Ok(queued)
    }

    /// Waits until every message published before this call was consumed.
    pub async fn drain(&self) {
        let mut acks = Vec::with_capacity(self.inner.slots.len());
        for slot in &self.inner.slots {
            let (tx, rx) = oneshot::channel();
            if slot.tx.send(Envelope::Flush(tx)).await.is_ok() {
                acks.push(rx);
            }
        }
        futures::future::join_all(acks).await;
    }

    /// Delivers what is queued, stops every delivery task and waits for them.
    ///
    /// Later publishes fail with [`BusError::Closed`]. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.tracker.wait().await;
            return;
        }
        for slot in &self.inner.slots {
            let _ = slot.tx.send(Envelope::Stop).await;
        }
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("Message bus stopped");
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Consumers that receive `kind`.
    #[must_use]
    pub fn subscribers(&self, kind: &MessageKind) -> Vec<&ExtensionId> {
        self.inner
            .routes
            .get(kind)
            .map(|targets| {
                targets
                    .iter()
                    .map(|&i| &self.inner.slots[i].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.inner.slots.len()
    }
}

#[async_trait]
impl MessagePublisher for MessageBus {
    async fn publish(
        &self,
        producer: &dyn DataProducer,
        message: Message,
    ) -> Result<(), ExtensionError> {
        MessageBus::publish(self, producer, message)
            .await
            .map(|_| ())
            .map_err(|e| ExtensionError::Publish(e.to_string()))
    }
}

async fn deliver_loop(consumer: Arc<dyn DataConsumer>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Deliver { producer, message } => {
                let outcome = AssertUnwindSafe(consumer.consume(&producer, &message))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(
                        consumer = %consumer.uid(),
                        kind = %message.kind(),
                        error = %e,
                        "Consumer failed"
                    ),
                    Err(_) => warn!(
                        consumer = %consumer.uid(),
                        kind = %message.kind(),
                        "Consumer panicked"
                    ),
                }
            }
            Envelope::Flush(ack) => {
                let _ = ack.send(());
            }
            Envelope::Stop => break,
        }
    }
}
