//! Core secnet wire constants and framing.
//!
//! This crate provides:
//! - Sizes of every fixed-width field on the wire
//! - Length-prefixed framing over an async byte stream
//!
//! # Wire Format
//!
//! Handshake, in each direction:
//! ```text
//! [32 bytes: X25519 public key]
//! ```
//!
//! Data frames:
//! ```text
//! [8 bytes: ciphertext length, little-endian] [ciphertext]
//! ```
//!
//! The ciphertext opens to `[24 bytes: next nonce] [payload]`.

#![forbid(unsafe_code)]

pub mod frame;

pub use frame::{FrameError, Framer};

/// Size of an X25519 public key, sent raw during the handshake.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Size of the shared symmetric key.
pub const SHARED_KEY_LEN: usize = 32;

/// Size of an XSalsa20 nonce.
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag overhead added by every seal.
pub const TAG_LEN: usize = 16;

/// Size of the little-endian frame length prefix.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Default upper bound on a single frame's ciphertext (1 MiB).
/// Prevents memory exhaustion from a hostile length prefix.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Smallest ciphertext a well-formed data frame can carry: an empty payload
/// still holds the next nonce plus the tag.
pub const MIN_FRAME_LEN: usize = NONCE_LEN + TAG_LEN;

/// Largest plaintext payload that fits in a frame of `max_frame_len` bytes.
pub const fn max_payload_len(max_frame_len: usize) -> usize {
    max_frame_len.saturating_sub(MIN_FRAME_LEN)
}
