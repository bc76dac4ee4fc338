//! Deterministic hash helpers for model fingerprints.

/// Small non-cryptographic FNV-1a hash.
#[derive(Copy, Clone, Debug)]
pub struct SimpleHash(u64);

impl SimpleHash {
    /// Create a new hash state with the FNV offset basis.
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    /// Feed bytes into the hash function.
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    /// Builder-style variant of [`SimpleHash::update`].
    pub fn chain(mut self, bytes: &[u8]) -> Self {
        self.update(bytes);
        self
    }

    pub fn finish64(&self) -> u64 {
        self.0
    }

    /// Finalise the hash and return a 16-character lowercase hex string.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl Default for SimpleHash {
    fn default() -> Self {
        Self::new()
    }
}
