use std::io;

use rand::{CryptoRng, RngCore};

/// RNG whose entropy source is permanently unavailable.
pub(crate) struct FailingRng;

impl RngCore for FailingRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {}

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(io::Error::new(
            io::ErrorKind::Other,
            "entropy unavailable",
        )))
    }
}

impl CryptoRng for FailingRng {}
