//! Secret memory types for key material and unlocked passwords.
//!
//! This module provides memory-safe wrappers that:
//! - Zero memory on drop via [`zeroize`]
//! - Mask output in `Debug`/`Display` to prevent accidental leakage
//! - Clone into a fresh allocation so every copy is zeroized independently

use crate::error::CryptoError;
use crate::rng;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// SecretBuffer: variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data (passwords, derived keys).
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate and adds:
/// - Masked `Debug` output (`SecretBuffer(***)`)
/// - Zeroization on drop (via `secrecy`'s built-in `Zeroize`)
/// - A deep `Clone` (a retained credential travels with each cloned vault)
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Create a new `SecretBuffer` by copying `data`.
    ///
    /// The caller should zeroize the source data after calling this.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Create a `SecretBuffer` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Random` if the CSPRNG fails.
    pub fn random(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = rng::random_bytes(len)?;
        let result = Self::new(&bytes);
        bytes.zeroize();
        Ok(result)
    }

    /// Expose the underlying bytes. Keep exposure within a single expression
    /// where possible.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for SecretBuffer {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N>: fixed-size
// ---------------------------------------------------------------------------

/// Fixed-size buffer for keys, seeds and hashes.
///
/// Derives `Zeroize` + `ZeroizeOnDrop` so the bytes are securely
/// erased when the value goes out of scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBytes<N> {
    /// Create a new `SecretBytes` from a fixed-size array.
    #[must_use]
    pub const fn new(data: [u8; N]) -> Self {
        Self { bytes: data }
    }

    /// Copy a slice of exactly `N` bytes into a new `SecretBytes`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` on a length mismatch.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; N] = data.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "expected {N} bytes, got {} bytes",
                data.len()
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Create `SecretBytes` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Random` if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; N];
        rng::fill_random(&mut bytes)?;
        let result = Self::new(bytes);
        bytes.zeroize();
        Ok(result)
    }

    /// Expose the underlying bytes for cryptographic operations.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> From<[u8; N]> for SecretBytes<N> {
    fn from(data: [u8; N]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
