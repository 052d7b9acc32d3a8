//! Length-prefixed framing over a byte stream.
//!
//! The underlying connection is a byte stream, not a message stream, so
//! every encoded command is written with a 4-byte big-endian length prefix:
//!
//! ```text
//! [4-byte length] [command bytes]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame size (16 MB). Larger frames are rejected before any
/// allocation happens.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Writes one length-prefixed frame and flushes.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(RpcError::Protocol(format!(
            "frame too large: {} bytes (max {MAX_FRAME_SIZE})",
            bytes.len()
        )));
    }

    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly at a
/// frame boundary. EOF in the middle of a frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::Protocol(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}
