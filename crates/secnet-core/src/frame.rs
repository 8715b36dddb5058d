//! Length-prefixed framing.
//!
//! A frame is an 8-byte little-endian length followed by that many bytes of
//! ciphertext. Stream transports deliver data in arbitrary chunks, so decoding
//! accumulates short reads until the exact length is available and never hands
//! a partial frame upward.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN, MIN_FRAME_LEN};

/// Framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended cleanly before any byte of a length field arrived.
    #[error("stream ended before a frame header")]
    EndOfStream,

    #[error("stream ended mid-frame: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("frame length {len} exceeds maximum {max}")]
    TooLarge { len: u64, max: usize },

    #[error("frame length {len} is below minimum {min}")]
    Undersized { len: usize, min: usize },

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Encodes and decodes length-prefixed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framer {
    max_frame_len: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Framer {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Build `length || ciphertext` as one contiguous buffer.
    pub fn encode(&self, ciphertext: &[u8]) -> Result<Bytes, FrameError> {
        self.check_length(ciphertext.len() as u64)?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + ciphertext.len());
        buf.put_u64_le(ciphertext.len() as u64);
        buf.put_slice(ciphertext);
        Ok(buf.freeze())
    }

    /// Validate a length prefix against the frame size bounds.
    pub fn parse_length(&self, header: [u8; LENGTH_PREFIX_LEN]) -> Result<usize, FrameError> {
        let len = u64::from_le_bytes(header);
        self.check_length(len)?;
        Ok(len as usize)
    }

    fn check_length(&self, len: u64) -> Result<(), FrameError> {
        if len > self.max_frame_len as u64 {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if len < MIN_FRAME_LEN as u64 {
            return Err(FrameError::Undersized {
                len: len as usize,
                min: MIN_FRAME_LEN,
            });
        }
        Ok(())
    }

    /// Write one frame with a single `write_all`, then flush.
    ///
    /// An error here means an unknown prefix of the frame may already be on the
    /// wire; the stream must be treated as broken.
    pub async fn write_frame<W>(&self, writer: &mut W, ciphertext: &[u8]) -> Result<(), FrameError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(ciphertext)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        trace!(len = ciphertext.len(), "frame written");
        Ok(())
    }

    /// Read one complete frame and return its ciphertext.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Vec<u8>, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; LENGTH_PREFIX_LEN];
        match read_full(reader, &mut header).await? {
            0 => return Err(FrameError::EndOfStream),
            n if n < LENGTH_PREFIX_LEN => {
                return Err(FrameError::Truncated {
                    expected: LENGTH_PREFIX_LEN,
                    received: n,
                })
            }
            _ => {}
        }

        let len = self.parse_length(header)?;
        let mut ciphertext = vec![0u8; len];
        let received = read_full(reader, &mut ciphertext).await?;
        if received < len {
            return Err(FrameError::Truncated {
                expected: len,
                received,
            });
        }

        trace!(len, "frame read");
        Ok(ciphertext)
    }
}

/// Fill `buf` from `reader`, looping over short reads.
///
/// Returns the number of bytes filled, which is less than `buf.len()` only if
/// the stream reached end-of-file first.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let framer = Framer::default();
        let body = [7u8; MIN_FRAME_LEN + 3];
        let frame = framer.encode(&body).unwrap();

        assert_eq!(frame.len(), LENGTH_PREFIX_LEN + body.len());
        assert_eq!(&frame[..8], &(body.len() as u64).to_le_bytes());
        assert_eq!(&frame[8..], &body[..]);
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let framer = Framer::new(64);
        let result = framer.encode(&[0u8; 65]);
        assert!(matches!(result, Err(FrameError::TooLarge { len: 65, max: 64 })));
    }

    #[test]
    fn test_encode_rejects_undersized() {
        let framer = Framer::default();
        let result = framer.encode(b"abc");
        assert!(matches!(result, Err(FrameError::Undersized { len: 3, .. })));
    }

    #[test]
    fn test_parse_length_rejects_huge_prefix() {
        let framer = Framer::default();
        let result = framer.parse_length(u64::MAX.to_le_bytes());
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    }

    #[tokio::test]
    async fn test_read_frame_roundtrip() {
        let framer = Framer::default();
        let first = [1u8; MIN_FRAME_LEN];
        let second = [2u8; 100];
        let mut wire = Vec::new();
        framer.write_frame(&mut wire, &first).await.unwrap();
        framer.write_frame(&mut wire, &second).await.unwrap();

        let mut reader = wire.as_slice();
        assert_eq!(framer.read_frame(&mut reader).await.unwrap(), first);
        assert_eq!(framer.read_frame(&mut reader).await.unwrap(), second);
        assert!(matches!(
            framer.read_frame(&mut reader).await,
            Err(FrameError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_truncated_header() {
        let framer = Framer::default();
        let mut reader: &[u8] = &[5, 0, 0];
        let result = framer.read_frame(&mut reader).await;
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 8,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let framer = Framer::default();
        let mut wire = 50u64.to_le_bytes().to_vec();
        wire.extend_from_slice(b"0123");

        let mut reader = wire.as_slice();
        let result = framer.read_frame(&mut reader).await;
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 50,
                received: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_one_byte_at_a_time() {
        let framer = Framer::default();
        let payload: Vec<u8> = (0..=255u8).collect();

        // A 1-byte duplex buffer forces every read to return a single byte.
        let (mut tx, mut rx) = tokio::io::duplex(1);
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            framer.write_frame(&mut tx, &payload).await.unwrap();
        });

        let frame = framer.read_frame(&mut rx).await.unwrap();
        writer.await.unwrap();
        assert_eq!(frame, expected);
    }
}
