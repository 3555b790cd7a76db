//! Chunked transfer loops over one connection.
//!
//! A fixed total byte count is moved as a sequence of variable-sized I/O
//! operations. Sends pick a uniformly random chunk size in `[1, remaining]`
//! per write; that is the behavior under test (it forces partial-write and
//! partial-read handling on both ends), not an optimization.

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;

/// Fill `buf` with the repeating pattern `index & 0xff`.
///
/// Deterministic content makes echo mismatches diagnosable by offset.
pub fn fill_pattern(buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = (i & 0xff) as u8;
    }
}

/// Build the send payload for one connection.
pub fn pattern_payload(size: usize) -> Bytes {
    let mut buf = BytesMut::zeroed(size);
    fill_pattern(&mut buf);
    buf.freeze()
}

/// Read exactly `buf.len()` bytes, accumulating across partial reads.
///
/// Each read targets the remaining suffix of `buf`, so the total can never
/// exceed the buffer. A read of zero bytes before the buffer is full means
/// the peer closed and surfaces as [`TransferError::Closed`].
pub async fn recv_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
{
    let expected = buf.len();
    let mut transferred = 0;

    while transferred < expected {
        let n = reader.read(&mut buf[transferred..]).await?;
        if n == 0 {
            return Err(TransferError::Closed {
                transferred,
                expected,
            });
        }
        transferred += n;
    }
    Ok(())
}

/// Write all of `data` in randomly sized chunks.
///
/// Each iteration picks a chunk size uniformly in `[1, remaining]` and
/// issues a single write of that slice; short writes are accepted and
/// accumulated like any other chunk.
pub async fn send_chunked<W, G>(writer: &mut W, data: &[u8], rng: &mut G) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
    G: Rng,
{
    let expected = data.len();
    let mut transferred = 0;

    while transferred < expected {
        let remaining = expected - transferred;
        let chunk = rng.gen_range(1..=remaining);

        let n = writer.write(&data[transferred..transferred + chunk]).await?;
        if n == 0 {
            return Err(TransferError::Closed {
                transferred,
                expected,
            });
        }
        transferred += n;
    }
    Ok(())
}
