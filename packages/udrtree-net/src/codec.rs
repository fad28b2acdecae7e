//! Wire encoding of operations and the length-prefixed framing used on every stream.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload. Operation payloads
//! are postcard-encoded [`MoveOperation`]s.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use udrtree_core::MoveOperation;

use crate::error::{NetError, Result};

pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub fn encode_op(op: &MoveOperation) -> Result<Bytes> {
    Ok(Bytes::from(postcard::to_stdvec(op)?))
}

pub fn decode_op(payload: &[u8]) -> Result<MoveOperation> {
    Ok(postcard::from_bytes(payload)?)
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(NetError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NetError::FrameTooLarge(len));
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload.freeze()))
}
