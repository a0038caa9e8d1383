//! Host-side IPC client.
//!
//! ```text
//! connect (retry until connect_timeout, linked to the run token)
//!    │
//! handshake: ModuleInfoRequest ──► ModuleInfoReply (version check)
//!    │
//! request/reply, one outstanding request at a time
//! ```
//!
//! An exchange that ends early (timeout, cancel or transport error) leaves
//! the stream mid-frame or with a reply still in flight. The client is then
//! broken and every later request fails with
//! [`IpcError::ConnectionClosed`].

use super::frame::{read_frame, write_frame};
use super::messages::{protocol_compatible, IpcMessage, ModuleInfoReply, ModuleInfoRequest, PROTOCOL_VERSION};
use super::serializer::SerializerRegistry;
use super::transport::{connect_once, BoxedStream, IpcStream};
use super::IpcError;
use crate::deadline::{Deadline, DeadlineError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Pause between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Timeouts for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Request/reply client over one duplex channel.
pub struct IpcClient {
    stream: Mutex<BoxedStream>,
    registry: Arc<SerializerRegistry>,
    request_timeout: Duration,
    broken: AtomicBool,
}

impl IpcClient {
    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(
        stream: impl IpcStream,
        registry: Arc<SerializerRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            stream: Mutex::new(Box::new(stream)),
            registry,
            request_timeout,
            broken: AtomicBool::new(false),
        }
    }

    /// Connects to `pipe_name`, retrying until the connect timeout.
    ///
    /// # Errors
    ///
    /// [`IpcError::ConnectTimeout`] or [`IpcError::Cancelled`].
    pub async fn connect(
        pipe_name: &str,
        registry: Arc<SerializerRegistry>,
        options: ClientOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, IpcError> {
        let deadline = Deadline::new(cancel, Some(options.connect_timeout));
        let attempt = async {
            loop {
                match connect_once(pipe_name).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                        return Err(IpcError::UnsupportedPlatform)
                    }
                    Err(e) => {
                        trace!(pipe = pipe_name, error = %e, "Controller not ready, retrying");
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        };

        let stream = match deadline.run(attempt).await {
            Ok(result) => result?,
            Err(DeadlineError::Cancelled) => return Err(IpcError::Cancelled),
            Err(DeadlineError::Timeout(after)) => {
                return Err(IpcError::ConnectTimeout {
                    pipe: pipe_name.to_string(),
                    after_ms: IpcError::millis(after),
                })
            }
        };
        debug!(pipe = pipe_name, "Connected to controller");
        Ok(Self {
            stream: Mutex::new(stream),
            registry,
            request_timeout: options.request_timeout,
            broken: AtomicBool::new(false),
        })
    }

    /// Sends `request` and waits for a reply of type `Rep`.
    ///
    /// # Errors
    ///
    /// - [`IpcError::UnregisteredType`] before any I/O if either type is unregistered
    /// - [`IpcError::RequestTimeout`] if no reply arrives in time
    /// - [`IpcError::Cancelled`] if `cancel` fires
    /// - [`IpcError::ConnectionClosed`] if the peer hung up, or if an earlier
    ///   exchange on this client ended early
    pub async fn request<Req, Rep>(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Rep, IpcError>
    where
        Req: IpcMessage,
        Rep: IpcMessage,
    {
        let frame = self.registry.encode(request)?;
        if !self.registry.is_registered::<Rep>() {
            return Err(IpcError::UnregisteredType(Rep::NAME));
        }

        if self.is_broken() {
            return Err(IpcError::ConnectionClosed);
        }

        let deadline = Deadline::new(cancel, Some(self.request_timeout));
        let exchange = async {
            let mut stream = self.stream.lock().await;
            write_frame(&mut *stream, &frame).await?;
            read_frame(&mut *stream).await?.ok_or(IpcError::ConnectionClosed)
        };

        let outcome = deadline.run(exchange).await;
        if !matches!(outcome, Ok(Ok(_))) {
            self.broken.store(true, Ordering::Release);
            warn!(request = Req::NAME, "IPC exchange ended early, closing the client");
        }
        let reply = match outcome {
            Ok(result) => result?,
            Err(DeadlineError::Cancelled) => return Err(IpcError::Cancelled),
            Err(DeadlineError::Timeout(after)) => {
                return Err(IpcError::RequestTimeout {
                    message: Req::NAME,
                    after_ms: IpcError::millis(after),
                })
            }
        };
        trace!(request = Req::NAME, reply = Rep::NAME, "IPC exchange complete");
        self.registry.decode(&reply)
    }

    /// `true` once an exchange ended early; the client cannot be reused.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Performs the identity exchange that must precede every other
    /// request.
    ///
    /// # Errors
    ///
    /// Any [`request`](Self::request) error, or
    /// [`IpcError::IncompatibleProtocol`].
    pub async fn handshake(
        &self,
        module_path: &str,
        cancel: &CancellationToken,
    ) -> Result<ModuleInfoReply, IpcError> {
        let reply: ModuleInfoReply = self
            .request(&ModuleInfoRequest::new(module_path), cancel)
            .await?;
        if !protocol_compatible(PROTOCOL_VERSION, &reply.protocol_version) {
            return Err(IpcError::IncompatibleProtocol {
                local: PROTOCOL_VERSION.to_string(),
                remote: reply.protocol_version,
            });
        }
        debug!(protocol = %reply.protocol_version, "IPC handshake complete");
        Ok(reply)
    }
}

impl std::fmt::Debug for IpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcClient")
            .field("request_timeout", &self.request_timeout)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}
