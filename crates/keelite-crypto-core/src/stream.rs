//! KDBX4 inner random stream.
//!
//! Protected XML values are XORed with one continuous keystream, consumed in
//! document order. Reader and writer must therefore visit protected values in
//! the same sequence.

use crate::error::CryptoError;
use crate::mac;
use aes::cipher::{KeyIvInit, StreamCipher};
use std::fmt;
use zeroize::Zeroize;

/// Inner stream algorithms a KDBX4 inner header may name (field 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InnerStreamAlgorithm {
    /// Id 2, legacy KDBX3 default. Recognized but not implemented.
    Salsa20,
    /// Id 3, the KDBX4 default.
    ChaCha20,
}

impl InnerStreamAlgorithm {
    /// Numeric id as stored in the inner header.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Salsa20 => 2,
            Self::ChaCha20 => 3,
        }
    }

    /// Resolve an inner header stream id.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedVersion` for unknown ids.
    pub fn from_id(id: u32) -> Result<Self, CryptoError> {
        match id {
            2 => Ok(Self::Salsa20),
            3 => Ok(Self::ChaCha20),
            other => Err(CryptoError::UnsupportedVersion(format!(
                "inner stream id {other}"
            ))),
        }
    }
}

/// Stateful keystream for protected values.
pub struct InnerStream {
    cipher: chacha20::ChaCha20,
}

impl InnerStream {
    /// Key the stream from the inner header's stream key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedVersion` for Salsa20.
    pub fn new(algorithm: InnerStreamAlgorithm, key: &[u8]) -> Result<Self, CryptoError> {
        if algorithm != InnerStreamAlgorithm::ChaCha20 {
            return Err(CryptoError::UnsupportedVersion(
                "Salsa20 inner stream".into(),
            ));
        }
        let mut digest = mac::sha512(&[key]);
        let result = digest
            .get(..32)
            .zip(digest.get(32..44))
            .ok_or_else(|| CryptoError::InvalidKeyMaterial("inner stream digest".into()))
            .and_then(|(k, n)| {
                chacha20::ChaCha20::new_from_slices(k, n)
                    .map_err(|e| CryptoError::InvalidKeyMaterial(format!("inner stream: {e}")))
            });
        digest.zeroize();
        Ok(Self { cipher: result? })
    }

    /// XOR `buf` with the next `buf.len()` keystream bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` once the keystream is exhausted.
    pub fn apply(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.cipher
            .try_apply_keystream(buf)
            .map_err(|e| CryptoError::Decryption(format!("inner stream exhausted: {e}")))
    }
}

impl fmt::Debug for InnerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InnerStream(***)")
    }
}
