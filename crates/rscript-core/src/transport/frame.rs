//! Length-prefixed frames.
//!
//! Format: 4-byte length (u32 LE) + payload bytes. Reads accumulate partial
//! results until the full count arrives; a zero-byte read before that is a
//! disconnect, never a short payload. Disconnect counts cover the whole
//! frame, prefix included.

use std::io::{Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Largest payload accepted by default (64 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub(crate) const PREFIX_LEN: usize = 4;

fn prefix_for(payload: &[u8]) -> Result<[u8; PREFIX_LEN], TransportError> {
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        length: payload.len(),
        limit: u32::MAX as usize,
    })?;
    Ok(len.to_le_bytes())
}

fn checked_len(prefix: [u8; PREFIX_LEN], limit: usize) -> Result<usize, TransportError> {
    let length = u32::from_le_bytes(prefix) as usize;
    if length > limit {
        return Err(TransportError::FrameTooLarge { length, limit });
    }
    Ok(length)
}

/// Write one frame and flush.
pub async fn send_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let prefix = prefix_for(payload)?;
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, rejecting payloads longer than `limit`.
pub async fn recv_frame<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; PREFIX_LEN];
    fill(reader, &mut prefix, 0).await?;
    let length = checked_len(prefix, limit)?;

    let mut payload = vec![0u8; length];
    fill(reader, &mut payload, PREFIX_LEN).await?;
    Ok(payload)
}

/// Fill `buf`; `before` is how many bytes of the frame were already read.
async fn fill<R>(reader: &mut R, buf: &mut [u8], before: usize) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut received = 0;
    while received < buf.len() {
        let n = reader.read(&mut buf[received..]).await?;
        if n == 0 {
            return Err(TransportError::Disconnected {
                expected: before + buf.len(),
                received: before + received,
            });
        }
        received += n;
    }
    Ok(())
}

/// Blocking counterpart of [`send_frame`].
pub fn write_frame_blocking<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: Write + ?Sized,
{
    let prefix = prefix_for(payload)?;
    writer.write_all(&prefix)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Blocking counterpart of [`recv_frame`].
pub fn read_frame_blocking<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, TransportError>
where
    R: Read + ?Sized,
{
    let mut prefix = [0u8; PREFIX_LEN];
    fill_blocking(reader, &mut prefix, 0)?;
    let length = checked_len(prefix, limit)?;

    let mut payload = vec![0u8; length];
    fill_blocking(reader, &mut payload, PREFIX_LEN)?;
    Ok(payload)
}

fn fill_blocking<R>(reader: &mut R, buf: &mut [u8], before: usize) -> Result<(), TransportError>
where
    R: Read + ?Sized,
{
    let mut received = 0;
    while received < buf.len() {
        let n = match reader.read(&mut buf[received..]) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(TransportError::Disconnected {
                expected: before + buf.len(),
                received: before + received,
            });
        }
        received += n;
    }
    Ok(())
}
