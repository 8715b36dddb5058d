//! Secure channel error taxonomy.
//!
//! Every variant except [`ChannelError::BufferTooSmall`] is terminal: the
//! caller must close the connection and never resume it, since a retry could
//! desynchronise nonce state.

use std::io;

use secnet_core::FrameError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("random source unavailable: {0}")]
    RandomSource(#[from] rand::Error),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("framing error: {0}")]
    Framing(FrameError),

    #[error("authentication failed")]
    Authentication,

    #[error("seal failed")]
    Seal,

    #[error("buffer too small: payload is {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A previous write failed part-way; the stream can no longer be trusted.
    #[error("channel failed on an earlier write")]
    Failed,

    #[error("handshake already complete")]
    HandshakeAlreadyComplete,

    #[error("handshake not complete")]
    HandshakeNotComplete,
}

impl ChannelError {
    /// Whether the connection must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BufferTooSmall { .. })
    }

    /// Whether the peer closed the stream on a frame boundary.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Framing(FrameError::EndOfStream))
    }
}

impl From<FrameError> for ChannelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::Transport(e),
            other => Self::Framing(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_io_maps_to_transport() {
        let err: ChannelError = FrameError::Io(io::ErrorKind::BrokenPipe.into()).into();
        assert!(matches!(err, ChannelError::Transport(_)));

        let err: ChannelError = FrameError::EndOfStream.into();
        assert!(err.is_clean_close());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_buffer_too_small_is_recoverable() {
        let err = ChannelError::BufferTooSmall {
            needed: 10,
            available: 4,
        };
        assert!(!err.is_fatal());
        assert!(!err.is_clean_close());
    }
}
