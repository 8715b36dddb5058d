//! Secure channel over a duplex byte stream.
//!
//! [`SecureChannel::open`] runs the handshake on a freshly connected stream and
//! binds a [`SecureReader`] and [`SecureWriter`] to the resulting key. The two
//! halves can be driven together through the channel or moved to separate
//! tasks with [`SecureChannel::split`].

use std::net::SocketAddr;
use std::sync::Arc;

use secnet_core::{FrameError, Framer, DEFAULT_MAX_FRAME_LEN, MIN_FRAME_LEN, PUBLIC_KEY_LEN};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ChannelError;
use crate::handshake::Handshake;
use crate::primitive::SharedKey;
use crate::stream::{SecureReader, SecureWriter};

/// Per-channel tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Upper bound on one frame's ciphertext, in bytes.
    pub max_frame_len: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ChannelConfig {
    /// Build a config, rejecting a frame limit that cannot hold an empty
    /// message.
    pub fn new(max_frame_len: usize) -> Result<Self, ChannelError> {
        let config = Self { max_frame_len };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(ChannelError::Framing(FrameError::Undersized {
                len: self.max_frame_len,
                min: MIN_FRAME_LEN,
            }));
        }
        Ok(())
    }

    pub fn framer(&self) -> Framer {
        Framer::new(self.max_frame_len)
    }
}

/// Encrypted, authenticated, bidirectional channel.
pub struct SecureChannel<S> {
    reader: SecureReader<ReadHalf<S>>,
    writer: SecureWriter<WriteHalf<S>>,
    peer_public_key: Option<[u8; PUBLIC_KEY_LEN]>,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Handshake over `stream` with a fresh ephemeral key pair.
    pub async fn open(stream: S) -> Result<Self, ChannelError> {
        Self::open_with_config(stream, ChannelConfig::default()).await
    }

    pub async fn open_with_config(stream: S, config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::open_with_handshake(stream, Handshake::new()?, config).await
    }

    /// Handshake over `stream` using a prepared [`Handshake`].
    pub async fn open_with_handshake(
        mut stream: S,
        mut handshake: Handshake,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        handshake.run(&mut stream).await?;
        let peer_public_key = handshake.peer_public_key();
        let key = handshake.into_shared_key()?;

        let mut channel = Self::from_shared_key(stream, key, config)?;
        channel.peer_public_key = peer_public_key;
        debug!("secure channel established");
        Ok(channel)
    }

    /// Bind a channel to an already agreed key, skipping the handshake.
    pub fn from_shared_key(
        stream: S,
        key: SharedKey,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        let key = Arc::new(key);
        let framer = config.framer();
        let (rd, wr) = tokio::io::split(stream);

        Ok(Self {
            reader: SecureReader::new(rd, key.clone(), framer),
            writer: SecureWriter::new(wr, key, framer),
            peer_public_key: None,
        })
    }

    /// Public key the peer sent during the handshake.
    pub fn peer_public_key(&self) -> Option<[u8; PUBLIC_KEY_LEN]> {
        self.peer_public_key
    }

    pub async fn write(&mut self, plaintext: &[u8]) -> Result<usize, ChannelError> {
        self.writer.write(plaintext).await
    }

    pub async fn read(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.reader.read().await
    }

    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.reader.read_into(buf).await
    }

    /// Separate the halves so they can run on different tasks.
    pub fn split(self) -> (SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }

    /// Shut down the write side and release the transport.
    pub async fn close(mut self) -> Result<(), ChannelError> {
        self.writer.shutdown().await
    }
}

/// Connect to `addr` over TCP and open a secure channel.
pub async fn dial<A: ToSocketAddrs>(addr: A) -> Result<SecureChannel<TcpStream>, ChannelError> {
    dial_with_config(addr, ChannelConfig::default()).await
}

pub async fn dial_with_config<A: ToSocketAddrs>(
    addr: A,
    config: ChannelConfig,
) -> Result<SecureChannel<TcpStream>, ChannelError> {
    let stream = TcpStream::connect(addr).await?;
    debug!(peer = ?stream.peer_addr().ok(), "connected");
    open_tcp(stream, config).await
}

/// Disable Nagle on a connected socket and run the handshake on it.
pub async fn open_tcp(
    stream: TcpStream,
    config: ChannelConfig,
) -> Result<SecureChannel<TcpStream>, ChannelError> {
    stream.set_nodelay(true)?;
    SecureChannel::open_with_config(stream, config).await
}

/// Accept one connection from `listener` and run the handshake on it.
pub async fn accept(
    listener: &TcpListener,
) -> Result<(SecureChannel<TcpStream>, SocketAddr), ChannelError> {
    accept_with_config(listener, ChannelConfig::default()).await
}

pub async fn accept_with_config(
    listener: &TcpListener,
    config: ChannelConfig,
) -> Result<(SecureChannel<TcpStream>, SocketAddr), ChannelError> {
    let (stream, peer) = listener.accept().await?;
    debug!(%peer, "accepted");
    let channel = open_tcp(stream, config).await?;
    Ok((channel, peer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::KeyPair;

    #[tokio::test]
    async fn test_open_pair() {
        let (left, right) = tokio::io::duplex(4096);
        let (a, b) = tokio::join!(SecureChannel::open(left), SecureChannel::open(right));
        let mut a = a.unwrap();
        let mut b = b.unwrap();

        assert!(a.peer_public_key().is_some());
        a.write(b"ping").await.unwrap();
        assert_eq!(b.read().await.unwrap(), b"ping");
        b.write(b"pong").await.unwrap();
        assert_eq!(a.read().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_from_shared_key() {
        let x = KeyPair::generate().unwrap();
        let y = KeyPair::generate().unwrap();
        let kx = x.precompute(&y.public_key());
        let ky = y.precompute(&x.public_key());

        let (left, right) = tokio::io::duplex(4096);
        let mut a = SecureChannel::from_shared_key(left, kx, ChannelConfig::default()).unwrap();
        let mut b = SecureChannel::from_shared_key(right, ky, ChannelConfig::default()).unwrap();
        assert!(a.peer_public_key().is_none());

        a.write(b"no handshake").await.unwrap();
        assert_eq!(b.read().await.unwrap(), b"no handshake");
    }

    #[tokio::test]
    async fn test_close_ends_peer_reads_cleanly() {
        let (left, right) = tokio::io::duplex(4096);
        let (a, b) = tokio::join!(SecureChannel::open(left), SecureChannel::open(right));
        let mut a = a.unwrap();
        let mut b = b.unwrap();

        a.write(b"last words").await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.read().await.unwrap(), b"last words");
        assert!(b.read().await.unwrap_err().is_clean_close());
    }

    #[test]
    fn test_config_rejects_limit_below_empty_frame() {
        assert!(matches!(
            ChannelConfig::new(MIN_FRAME_LEN - 1),
            Err(ChannelError::Framing(FrameError::Undersized { len: 39, min: 40 }))
        ));
        assert!(matches!(
            ChannelConfig::new(10),
            Err(ChannelError::Framing(FrameError::Undersized { .. }))
        ));
        let smallest = ChannelConfig::new(MIN_FRAME_LEN).unwrap();
        assert_eq!(smallest.framer().max_frame_len(), MIN_FRAME_LEN);
    }

    #[tokio::test]
    async fn test_open_rejects_undersized_config_before_handshake() {
        let (left, _right) = tokio::io::duplex(64);
        let config = ChannelConfig { max_frame_len: 10 };
        assert!(matches!(
            SecureChannel::open_with_config(left, config).await,
            Err(ChannelError::Framing(FrameError::Undersized { len: 10, .. }))
        ));

        let x = KeyPair::generate().unwrap();
        let key = x.precompute(&KeyPair::generate().unwrap().public_key());
        let (left, _right) = tokio::io::duplex(64);
        assert!(SecureChannel::from_shared_key(left, key, config).is_err());
    }

    #[tokio::test]
    async fn test_empty_writes_at_smallest_limit() {
        let (left, right) = tokio::io::duplex(4096);
        let config = ChannelConfig::new(MIN_FRAME_LEN).unwrap();
        let (a, b) = tokio::join!(
            SecureChannel::open_with_config(left, config),
            SecureChannel::open_with_config(right, config)
        );
        let mut a = a.unwrap();
        let mut b = b.unwrap();

        for _ in 0..2 {
            assert_eq!(a.write(b"").await.unwrap(), 0);
            assert!(b.read().await.unwrap().is_empty());
        }
        assert!(matches!(
            a.write(b"x").await,
            Err(ChannelError::Framing(FrameError::TooLarge { len: 41, max: 40 }))
        ));
        assert_eq!(a.write(b"").await.unwrap(), 0);
        assert!(b.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_halves_on_tasks() {
        let (left, right) = tokio::io::duplex(4096);
        let (a, b) = tokio::join!(SecureChannel::open(left), SecureChannel::open(right));
        let (mut a_rd, mut a_wr) = a.unwrap().split();
        let (mut b_rd, mut b_wr) = b.unwrap().split();

        let sender = tokio::spawn(async move {
            for i in 0..20u32 {
                a_wr.write(&i.to_le_bytes()).await.unwrap();
            }
        });
        let echo = tokio::spawn(async move {
            for _ in 0..20 {
                let msg = b_rd.read().await.unwrap();
                b_wr.write(&msg).await.unwrap();
            }
        });

        for i in 0..20u32 {
            assert_eq!(a_rd.read().await.unwrap(), i.to_le_bytes());
        }
        sender.await.unwrap();
        echo.await.unwrap();
    }
}
