//! Controller-side IPC server.

use super::frame::{read_frame, write_frame};
use super::messages::{IpcReply, IpcRequest};
use super::serializer::SerializerRegistry;
use super::transport::{BoxedStream, IpcStream, Listener};
use super::IpcError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Answers requests arriving from a test host.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handles one request.
    ///
    /// # Errors
    ///
    /// A handler error is logged and ends the connection.
    async fn handle(&self, request: IpcRequest) -> Result<IpcReply, IpcError>;
}

/// Listens on a named channel for one or more hosts.
pub struct IpcServer {
    listener: Listener,
    pipe_name: String,
    registry: Arc<SerializerRegistry>,
}

impl IpcServer {
    /// Binds `pipe_name`, replacing a stale socket file.
    ///
    /// # Errors
    ///
    /// [`IpcError::Io`] or [`IpcError::UnsupportedPlatform`].
    pub fn bind(pipe_name: &str, registry: Arc<SerializerRegistry>) -> Result<Self, IpcError> {
        let listener = Listener::bind(pipe_name)?;
        debug!(pipe = pipe_name, path = %listener.path().display(), "IPC server listening");
        Ok(Self {
            listener,
            pipe_name: pipe_name.to_string(),
            registry,
        })
    }

    #[must_use]
    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    /// Waits for a host to connect.
    ///
    /// # Errors
    ///
    /// [`IpcError::ConnectTimeout`], [`IpcError::Cancelled`] or the
    /// transport error.
    pub async fn accept(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IpcConnection, IpcError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(IpcError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(IpcError::ConnectTimeout {
                pipe: self.pipe_name.clone(),
                after_ms: IpcError::millis(timeout),
            }),
            stream = self.listener.accept() => Ok(IpcConnection {
                stream: stream?,
                registry: Arc::clone(&self.registry),
            }),
        }
    }
}

/// One accepted host connection.
pub struct IpcConnection {
    stream: BoxedStream,
    registry: Arc<SerializerRegistry>,
}

impl IpcConnection {
    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(stream: impl IpcStream, registry: Arc<SerializerRegistry>) -> Self {
        Self {
            stream: Box::new(stream),
            registry,
        }
    }

    /// Serves requests until the host hangs up or `cancel` fires.
    ///
    /// Returns the number of requests served.
    ///
    /// # Errors
    ///
    /// Decoding, handler or transport errors end the connection.
    pub async fn serve<H>(mut self, handler: &H, cancel: &CancellationToken) -> Result<usize, IpcError>
    where
        H: RequestHandler + ?Sized,
    {
        let mut served = 0;
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Err(IpcError::Cancelled),
                frame = read_frame(&mut self.stream) => frame?,
            };
            let Some(frame) = frame else {
                debug!(served, "Host closed IPC connection");
                return Ok(served);
            };

            let request = self.registry.decode_request(&frame)?;
            trace!(request = request.name(), "IPC request received");
            let reply = match handler.handle(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "IPC request handler failed");
                    return Err(e);
                }
            };
            let frame = self.registry.encode_reply(&reply)?;
            write_frame(&mut self.stream, &frame).await?;
            served += 1;
        }
    }
}
