//! Chained nonces.
//!
//! Every frame carries, inside its ciphertext, the nonce that will seal the
//! next frame in the same direction. Nonces are fresh random values rather
//! than counters, so a (key, nonce) pair can never seal twice even if a write
//! is retried, and the receiver can only learn the next nonce by successfully
//! opening the current frame.
//!
//! Both directions start from [`Nonce::ZERO`].
//!
//! # Thread Safety
//!
//! A sequencer is owned by exactly one reader or writer half and mutated
//! through `&mut self`; it is never shared.

use std::fmt;

use rand::{CryptoRng, RngCore};
use secnet_core::NONCE_LEN;

use crate::error::ChannelError;

/// 24-byte XSalsa20 nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Initial nonce for the first frame in each direction.
    pub const ZERO: Self = Self([0u8; NONCE_LEN]);

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ChannelError> {
        let mut bytes = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// Nonces handed out for a single outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundNonces {
    /// Seals the frame being written now.
    pub seal: Nonce,
    /// Travels inside that frame and seals the one after it.
    pub next: Nonce,
}

/// Nonce state for one direction of a channel.
#[derive(Debug, Clone, Default)]
pub struct NonceSequencer {
    current: Nonce,
}

impl NonceSequencer {
    pub fn new(initial: Nonce) -> Self {
        Self { current: initial }
    }

    /// Nonce for the next frame in this direction.
    pub fn current(&self) -> Nonce {
        self.current
    }

    /// Draw a fresh nonce for the following write and commit it.
    ///
    /// The returned `seal` nonce is retired immediately, before the frame
    /// reaches the transport. If the RNG fails, state is left unchanged.
    pub fn next_outbound<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<OutboundNonces, ChannelError> {
        let next = Nonce::random(rng)?;
        let seal = std::mem::replace(&mut self.current, next);
        Ok(OutboundNonces { seal, next })
    }

    /// Record the nonce recovered from a successfully opened inbound frame.
    pub fn advance_inbound(&mut self, received_next: Nonce) {
        self.current = received_next;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::OsRng;

    use super::*;
    use crate::testing::FailingRng;

    #[test]
    fn test_starts_at_zero() {
        let seq = NonceSequencer::default();
        assert_eq!(seq.current(), Nonce::ZERO);
    }

    #[test]
    fn test_outbound_chain() {
        let mut seq = NonceSequencer::default();

        let first = seq.next_outbound(&mut OsRng).unwrap();
        assert_eq!(first.seal, Nonce::ZERO);
        assert_eq!(seq.current(), first.next);

        let second = seq.next_outbound(&mut OsRng).unwrap();
        assert_eq!(second.seal, first.next);
        assert_eq!(seq.current(), second.next);
    }

    #[test]
    fn test_outbound_nonces_are_unique() {
        let mut seq = NonceSequencer::default();
        let mut seen = HashSet::new();

        for _ in 0..1000 {
            let nonces = seq.next_outbound(&mut OsRng).unwrap();
            assert!(seen.insert(nonces.seal), "nonce reused: {:?}", nonces.seal);
        }
    }

    #[test]
    fn test_rng_failure_leaves_state() {
        let initial = Nonce::from_bytes([9u8; NONCE_LEN]);
        let mut seq = NonceSequencer::new(initial);

        let result = seq.next_outbound(&mut FailingRng);
        assert!(matches!(result, Err(ChannelError::RandomSource(_))));
        assert_eq!(seq.current(), initial);
    }

    #[test]
    fn test_advance_inbound() {
        let mut seq = NonceSequencer::default();
        let next = Nonce::from_bytes([7u8; NONCE_LEN]);

        seq.advance_inbound(next);
        assert_eq!(seq.current(), next);
    }
}
