//! Secure channel for secnet.
//!
//! This crate provides:
//! - Ephemeral X25519 key exchange over a raw byte stream
//! - NaCl `box` precomputation and XSalsa20-Poly1305 seal/open
//! - Chained per-direction nonces carried inside each frame
//! - Stateful reader/writer halves and a combined [`SecureChannel`]
//!
//! # Design
//!
//! The channel assumes a reliable, ordered stream (TCP). The nonce for frame
//! N+1 travels encrypted inside frame N, so frames must be opened in order and
//! a receiver cannot advance without authenticating the previous frame.
//!
//! Every error other than [`ChannelError::BufferTooSmall`] is terminal for the
//! connection. Nothing is retried internally.

#![forbid(unsafe_code)]

pub mod channel;
pub mod error;
pub mod handshake;
pub mod nonce;
pub mod primitive;
pub mod stream;

#[cfg(test)]
mod testing;

pub use channel::{
    accept, accept_with_config, dial, dial_with_config, open_tcp, ChannelConfig, SecureChannel,
};
pub use error::ChannelError;
pub use handshake::{Handshake, HandshakeState};
pub use nonce::{Nonce, NonceSequencer, OutboundNonces};
pub use primitive::{KeyPair, SharedKey};
pub use stream::{SecureReader, SecureWriter};
