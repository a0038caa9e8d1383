//! Wire framing.
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────────┐
//! │ len: u32 BE  │ serializer: u16│ body: len bytes  │
//! └──────────────┴────────────────┴──────────────────┘
//! ```
//!
//! `len` counts only the body. A clean EOF before the first header byte
//! ends the stream; EOF anywhere else is a closed connection.

use super::IpcError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub serializer_id: u16,
    pub body: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(serializer_id: u16, body: Vec<u8>) -> Self {
        Self {
            serializer_id,
            body,
        }
    }
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// [`IpcError::FrameTooLarge`] or the transport error.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if frame.body.len() > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge {
            len: frame.body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let len = u32::try_from(frame.body.len()).map_err(|_| IpcError::FrameTooLarge {
        len: frame.body.len(),
        max: MAX_FRAME_LEN,
    })?;

    let mut header = [0u8; 6];
    header[..4].copy_from_slice(&len.to_be_bytes());
    header[4..].copy_from_slice(&frame.serializer_id.to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&frame.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. Returns `None` on a clean EOF.
///
/// # Errors
///
/// [`IpcError::FrameTooLarge`], [`IpcError::ConnectionClosed`] on a
/// truncated frame, or the transport error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, IpcError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; 6];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[first..]).await?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let serializer_id = u16::from_be_bytes([header[4], header[5]]);
    if len > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(Frame::new(serializer_id, body)))
}
