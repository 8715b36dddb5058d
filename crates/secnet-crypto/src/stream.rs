//! Stateful read and write halves of a secure channel.
//!
//! Each call moves exactly one frame:
//!
//! ```text
//! write: next = random()                     read: ct = read_frame()
//!        ct = seal(next || data, current)          msg = open(ct, current)
//!        write_frame(ct)                           current = msg[..24]
//!        current = next                            return msg[24..]
//! ```
//!
//! There is no buffering or coalescing: one `write` is one frame is one
//! `read` on the other side.

use std::sync::Arc;

use rand::rngs::OsRng;
use secnet_core::{max_payload_len, FrameError, Framer, MIN_FRAME_LEN, NONCE_LEN};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};
use zeroize::Zeroize;

use crate::error::ChannelError;
use crate::nonce::{Nonce, NonceSequencer};
use crate::primitive::SharedKey;

/// Writing half of a secure channel.
pub struct SecureWriter<W> {
    inner: W,
    key: Arc<SharedKey>,
    framer: Framer,
    nonces: NonceSequencer,
    failed: bool,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    /// Bind a writer to `key`, starting from the zero nonce.
    pub fn new(inner: W, key: Arc<SharedKey>, framer: Framer) -> Self {
        Self {
            inner,
            key,
            framer,
            nonces: NonceSequencer::default(),
            failed: false,
        }
    }

    /// Nonce that will seal the next frame.
    pub fn current_nonce(&self) -> Nonce {
        self.nonces.current()
    }

    /// Largest plaintext a single `write` accepts.
    pub fn max_payload_len(&self) -> usize {
        max_payload_len(self.framer.max_frame_len())
    }

    /// Encrypt `plaintext` and send it as one frame.
    ///
    /// Returns `plaintext.len()` on success. After a transport error the writer
    /// is poisoned and every later call fails with [`ChannelError::Failed`].
    pub async fn write(&mut self, plaintext: &[u8]) -> Result<usize, ChannelError> {
        if self.failed {
            return Err(ChannelError::Failed);
        }
        // Reject before a nonce is committed; once sealed, the frame must reach
        // the wire or the chain is broken.
        let frame_len = plaintext.len().saturating_add(MIN_FRAME_LEN);
        if frame_len > self.framer.max_frame_len() {
            return Err(ChannelError::Framing(FrameError::TooLarge {
                len: frame_len as u64,
                max: self.framer.max_frame_len(),
            }));
        }

        let nonces = self.nonces.next_outbound(&mut OsRng)?;

        let mut message = Vec::with_capacity(NONCE_LEN + plaintext.len());
        message.extend_from_slice(nonces.next.as_bytes());
        message.extend_from_slice(plaintext);
        let sealed = self.key.seal(&message, &nonces.seal);
        message.zeroize();
        let ciphertext = sealed?;

        if let Err(e) = self.framer.write_frame(&mut self.inner, &ciphertext).await {
            warn!("write failed, poisoning channel: {}", e);
            self.failed = true;
            return Err(e.into());
        }

        trace!(len = plaintext.len(), "sealed frame sent");
        Ok(plaintext.len())
    }

    /// Shut down the write side of the transport.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reading half of a secure channel.
pub struct SecureReader<R> {
    inner: R,
    key: Arc<SharedKey>,
    framer: Framer,
    nonces: NonceSequencer,
    /// A frame already taken off the wire but not yet opened.
    pending: Option<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    /// Bind a reader to `key`, starting from the zero nonce.
    pub fn new(inner: R, key: Arc<SharedKey>, framer: Framer) -> Self {
        Self {
            inner,
            key,
            framer,
            nonces: NonceSequencer::default(),
            pending: None,
        }
    }

    /// Nonce expected to open the next frame.
    pub fn current_nonce(&self) -> Nonce {
        self.nonces.current()
    }

    /// Payload length of a frame held back by an earlier
    /// [`ChannelError::BufferTooSmall`], if any.
    pub fn pending_len(&self) -> Option<usize> {
        self.pending.as_ref().map(|ct| payload_len(ct))
    }

    /// Receive and decrypt the next frame.
    ///
    /// On [`ChannelError::Authentication`] the nonce state is left untouched
    /// and the channel must be closed.
    pub async fn read(&mut self) -> Result<Vec<u8>, ChannelError> {
        let ciphertext = self.next_frame().await?;
        self.open_frame(&ciphertext)
    }

    /// Receive the next frame into `buf`.
    ///
    /// If `buf` cannot hold the payload, the frame is kept unopened and
    /// [`ChannelError::BufferTooSmall`] is returned; the next call delivers it.
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let ciphertext = self.next_frame().await?;

        let needed = payload_len(&ciphertext);
        if needed > buf.len() {
            self.pending = Some(ciphertext);
            return Err(ChannelError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let mut payload = self.open_frame(&ciphertext)?;
        buf[..payload.len()].copy_from_slice(&payload);
        payload.zeroize();
        Ok(needed)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        match self.pending.take() {
            Some(ciphertext) => Ok(ciphertext),
            None => Ok(self.framer.read_frame(&mut self.inner).await?),
        }
    }

    fn open_frame(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let mut message = self.key.open(ciphertext, &self.nonces.current())?;

        // The framer guarantees at least NONCE_LEN bytes of plaintext.
        let payload = message.split_off(NONCE_LEN);
        let next: [u8; NONCE_LEN] = message
            .as_slice()
            .try_into()
            .map_err(|_| ChannelError::Authentication)?;
        message.zeroize();

        self.nonces.advance_inbound(Nonce::from_bytes(next));
        trace!(len = payload.len(), "frame opened");
        Ok(payload)
    }
}

fn payload_len(ciphertext: &[u8]) -> usize {
    ciphertext.len().saturating_sub(MIN_FRAME_LEN)
}
