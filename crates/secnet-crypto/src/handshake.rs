//! Ephemeral key exchange.
//!
//! # Handshake Flow
//!
//! ```text
//! Peer A                                  Peer B
//!     |  -> public_key_a (32 bytes, raw)     |
//!     |------------------------------------->|
//!     |  <- public_key_b (32 bytes, raw)     |
//!     |<-------------------------------------|
//!     |                                      |
//!     [  shared = precompute(private, peer)  ]
//! ```
//!
//! Both sides send and receive at the same time; there is no initiator or
//! responder role. Neither key is authenticated, so an active attacker in the
//! path can substitute its own keys. Callers that need identity binding must
//! add it above this layer.

use secnet_core::PUBLIC_KEY_LEN;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ChannelError;
use crate::primitive::{KeyPair, SharedKey};

/// Observable handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingPeerKey,
    Established,
}

enum Stage {
    AwaitingPeerKey,
    Established {
        peer_public_key: [u8; PUBLIC_KEY_LEN],
        shared_key: SharedKey,
    },
}

/// One side of the key exchange.
pub struct Handshake {
    keypair: KeyPair,
    stage: Stage,
}

impl Handshake {
    /// Start a handshake with a freshly generated ephemeral key pair.
    pub fn new() -> Result<Self, ChannelError> {
        Ok(Self::with_keypair(KeyPair::generate()?))
    }

    /// Start a handshake with a caller-supplied key pair.
    pub fn with_keypair(keypair: KeyPair) -> Self {
        Self {
            keypair,
            stage: Stage::AwaitingPeerKey,
        }
    }

    pub fn state(&self) -> HandshakeState {
        match self.stage {
            Stage::AwaitingPeerKey => HandshakeState::AwaitingPeerKey,
            Stage::Established { .. } => HandshakeState::Established,
        }
    }

    pub fn local_public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.keypair.public_key()
    }

    /// The peer's public key, once received.
    pub fn peer_public_key(&self) -> Option<[u8; PUBLIC_KEY_LEN]> {
        match &self.stage {
            Stage::Established {
                peer_public_key, ..
            } => Some(*peer_public_key),
            Stage::AwaitingPeerKey => None,
        }
    }

    /// Accept the peer's public key and derive the shared key.
    pub fn receive_peer_key(
        &mut self,
        peer_public_key: [u8; PUBLIC_KEY_LEN],
    ) -> Result<(), ChannelError> {
        if let Stage::Established { .. } = self.stage {
            return Err(ChannelError::HandshakeAlreadyComplete);
        }

        let shared_key = self.keypair.precompute(&peer_public_key);
        self.stage = Stage::Established {
            peer_public_key,
            shared_key,
        };
        Ok(())
    }

    /// Exchange public keys over `stream` and derive the shared key.
    ///
    /// The peer key lands in a fixed 32-byte buffer filled by `read_exact`;
    /// a stream that closes early fails with [`ChannelError::Transport`].
    pub async fn run<S>(&mut self, stream: &mut S) -> Result<(), ChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Stage::Established { .. } = self.stage {
            return Err(ChannelError::HandshakeAlreadyComplete);
        }

        let local = self.local_public_key();
        let mut peer = [0u8; PUBLIC_KEY_LEN];

        let (mut rd, mut wr) = tokio::io::split(&mut *stream);
        let send = async {
            wr.write_all(&local).await?;
            wr.flush().await
        };
        tokio::try_join!(send, rd.read_exact(&mut peer))?;

        debug!(
            local = %hex::encode(local),
            peer = %hex::encode(peer),
            "public keys exchanged"
        );
        self.receive_peer_key(peer)
    }

    /// Finish the handshake, yielding the shared key.
    ///
    /// The ephemeral private key is dropped (and zeroized) here.
    pub fn into_shared_key(self) -> Result<SharedKey, ChannelError> {
        match self.stage {
            Stage::Established { shared_key, .. } => Ok(shared_key),
            Stage::AwaitingPeerKey => Err(ChannelError::HandshakeNotComplete),
        }
    }
}
