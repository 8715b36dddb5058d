//! Public-key authenticated encryption.
//!
//! This is the NaCl `box` construction split into its two halves:
//! - precomputation: `HSalsa20(X25519(private, peer_public), 0^16)`
//! - seal/open: XSalsa20-Poly1305 under the precomputed key
//!
//! The output is byte-compatible with `crypto_box_beforenm` followed by
//! `crypto_box_afternm`, so peers written against libsodium or Go's
//! `nacl/box` interoperate.

use std::fmt;

use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use salsa20::cipher::consts::U10;
use salsa20::hsalsa;
use secnet_core::{PUBLIC_KEY_LEN, SHARED_KEY_LEN, TAG_LEN};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::ChannelError;
use crate::nonce::Nonce;

/// Ephemeral X25519 key pair.
///
/// The private half is zeroized on drop and never leaves this struct.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Result<Self, ChannelError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a fresh key pair from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ChannelError> {
        let mut private = Zeroizing::new([0u8; 32]);
        rng.try_fill_bytes(&mut *private)?;
        Ok(Self::from_secret(StaticSecret::from(*private)))
    }

    /// Rebuild a key pair from raw private key bytes.
    ///
    /// The caller's array is copied; this function wipes its own copy.
    pub fn from_private_bytes(mut private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        private.zeroize();
        Self::from_secret(secret)
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Derive the symmetric key shared with `remote_public`.
    pub fn precompute(&self, remote_public: &[u8; PUBLIC_KEY_LEN]) -> SharedKey {
        let remote = PublicKey::from(*remote_public);
        let dh = self.secret.diffie_hellman(&remote);

        let mut derived = hsalsa::<U10>(dh.as_bytes().into(), &GenericArray::default());
        let mut key = [0u8; SHARED_KEY_LEN];
        key.copy_from_slice(&derived);
        derived.as_mut_slice().zeroize();

        SharedKey(key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Precomputed symmetric key for one connection.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; SHARED_KEY_LEN]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new((&self.0).into())
    }

    /// Authenticated encryption. Output is `plaintext.len() + TAG_LEN` bytes.
    pub fn seal(&self, plaintext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, ChannelError> {
        let nonce = GenericArray::from(*nonce.as_bytes());
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|_| ChannelError::Seal)?;
        debug_assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
        Ok(ciphertext)
    }

    /// Authenticated decryption. Fails closed: no plaintext is returned unless
    /// the tag verifies under this key and nonce.
    pub fn open(&self, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, ChannelError> {
        if ciphertext.len() < TAG_LEN {
            return Err(ChannelError::Authentication);
        }
        let nonce = GenericArray::from(*nonce.as_bytes());
        self.cipher()
            .decrypt(&nonce, ciphertext)
            .map_err(|_| ChannelError::Authentication)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}
