//! Named-channel transport.
//!
//! On Unix a pipe name maps to a domain socket at
//! `<temp dir>/<pipe name>.sock`. Other platforms report
//! [`IpcError::UnsupportedPlatform`].

use super::IpcError;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

/// A duplex byte stream usable as an IPC channel.
pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> IpcStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Boxed stream held by clients and connections.
pub type BoxedStream = Box<dyn IpcStream>;

/// Socket path for `pipe_name`.
#[must_use]
pub fn socket_path(pipe_name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.sock", pipe_name))
}

/// A fresh, unique pipe name.
#[must_use]
pub fn generate_pipe_name() -> String {
    format!("testhost-{}", Uuid::new_v4().simple())
}

/// Connects once to `pipe_name`.
#[cfg(unix)]
pub(crate) async fn connect_once(pipe_name: &str) -> std::io::Result<BoxedStream> {
    let stream = tokio::net::UnixStream::connect(socket_path(pipe_name)).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
pub(crate) async fn connect_once(_pipe_name: &str) -> std::io::Result<BoxedStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        IpcError::UnsupportedPlatform.to_string(),
    ))
}

/// Listening side of a named channel.
#[cfg(unix)]
pub(crate) struct Listener {
    inner: tokio::net::UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Listener {
    pub(crate) fn bind(pipe_name: &str) -> Result<Self, IpcError> {
        let path = socket_path(pipe_name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let inner = tokio::net::UnixListener::bind(&path)?;
        Ok(Self { inner, path })
    }

    pub(crate) async fn accept(&self) -> Result<BoxedStream, IpcError> {
        let (stream, _) = self.inner.accept().await?;
        Ok(Box::new(stream))
    }

    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(not(unix))]
pub(crate) struct Listener {
    path: PathBuf,
}

#[cfg(not(unix))]
impl Listener {
    pub(crate) fn bind(_pipe_name: &str) -> Result<Self, IpcError> {
        Err(IpcError::UnsupportedPlatform)
    }

    pub(crate) async fn accept(&self) -> Result<BoxedStream, IpcError> {
        Err(IpcError::UnsupportedPlatform)
    }

    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }
}
