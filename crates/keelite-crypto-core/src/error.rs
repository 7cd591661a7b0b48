//! Cryptographic error types for `keelite-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (Argon2 parameter validation, memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The requested algorithm or algorithm version is not implemented.
    ///
    /// Raised instead of falling back to a different derivation or cipher,
    /// so a vault is never opened with a silently different key.
    #[error("unsupported algorithm: {0}")]
    UnsupportedVersion(String),

    /// Payload encryption failure (AES-256-CBC, ChaCha20).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Payload decryption failure (bad padding, truncated ciphertext).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// The operating system CSPRNG could not produce bytes.
    #[error("random source error: {0}")]
    Random(String),
}
