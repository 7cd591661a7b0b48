//! Key derivation for KDBX4 vaults.
//!
//! This module provides:
//! - [`derive_key`]: Argon2d / Argon2id with caller-chosen output length
//! - [`derive`]: the 32-byte transformed key used by the KDBX codec
//! - [`derive_aes_kdf`]: the legacy KDBX AES-KDF (AES-256-ECB rounds + SHA-256)
//! - [`Argon2Params`]: serializable parameter set (stored in the vault header)
//! - [`KdfPreset`]: Fast / Balanced / Maximum presets for new vaults
//!
//! # Version policy
//!
//! Exactly one Argon2 version is implemented (`0x13`). A header declaring any
//! other version is rejected with [`CryptoError::UnsupportedVersion`].

use crate::error::CryptoError;
use crate::mac;
use crate::memory::{SecretBuffer, SecretBytes};
use aes::cipher::{BlockEncrypt, KeyInit};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Output length of the KDBX transformed key in bytes (256 bits).
pub const OUTPUT_LEN: usize = 32;

/// The only Argon2 version this engine derives with.
pub const ARGON2_VERSION: u32 = 0x13;

/// Minimum salt length accepted by the `argon2` crate.
const MIN_SALT_LEN: usize = 8;

/// 16 MiB in KiB.
const MEMORY_16MB: u32 = 16_384;

/// 64 MiB in KiB.
const MEMORY_64MB: u32 = 65_536;

/// 256 MiB in KiB.
const MEMORY_256MB: u32 = 262_144;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Argon2 flavour declared by the vault header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argon2Variant {
    /// Data-dependent Argon2d (KeePass default).
    Argon2d,
    /// Hybrid Argon2id.
    Argon2id,
}

impl Argon2Variant {
    const fn algorithm(self) -> argon2::Algorithm {
        match self {
            Self::Argon2d => argon2::Algorithm::Argon2d,
            Self::Argon2id => argon2::Algorithm::Argon2id,
        }
    }
}

/// Argon2 parameter set, stored in the vault header.
///
/// Fields use the `argon2` crate convention:
/// - `memory_kib`: memory in KiB (the KDBX header stores bytes)
/// - `iterations`: number of passes (time cost)
/// - `parallelism`: number of lanes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Argon2d or Argon2id.
    pub variant: Argon2Variant,
    /// Memory cost in kibibytes.
    pub memory_kib: u32,
    /// Number of iterations.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
    /// Argon2 version number (`0x13`).
    pub version: u32,
}

/// KDF preset selector for newly created vaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfPreset {
    /// Quick unlock on modest hardware.
    Fast,
    /// Recommended daily driver.
    #[default]
    Balanced,
    /// High memory cost for long-lived archives.
    Maximum,
}

impl KdfPreset {
    /// Return the Argon2d parameters for this preset.
    #[must_use]
    pub const fn default_params(self) -> Argon2Params {
        match self {
            Self::Fast => Argon2Params {
                variant: Argon2Variant::Argon2d,
                memory_kib: MEMORY_16MB,
                iterations: 4,
                parallelism: 2,
                version: ARGON2_VERSION,
            },
            Self::Balanced => Argon2Params {
                variant: Argon2Variant::Argon2d,
                memory_kib: MEMORY_64MB,
                iterations: 8,
                parallelism: 2,
                version: ARGON2_VERSION,
            },
            Self::Maximum => Argon2Params {
                variant: Argon2Variant::Argon2d,
                memory_kib: MEMORY_256MB,
                iterations: 8,
                parallelism: 4,
                version: ARGON2_VERSION,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Argon2
// ---------------------------------------------------------------------------

/// Derive `output_len` bytes from a password and salt with Argon2.
///
/// # Errors
///
/// Returns `CryptoError::UnsupportedVersion` if `params.version` is not `0x13`.
/// Returns `CryptoError::KeyDerivation` if:
/// - The salt is shorter than 8 bytes
/// - The argon2 parameters are invalid
/// - The derivation itself fails (e.g., memory allocation)
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &Argon2Params,
    output_len: usize,
) -> Result<SecretBuffer, CryptoError> {
    if params.version != ARGON2_VERSION {
        return Err(CryptoError::UnsupportedVersion(format!(
            "argon2 version {:#x} (only {ARGON2_VERSION:#x} is implemented)",
            params.version
        )));
    }

    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let argon2_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(output_len),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        params.variant.algorithm(),
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = vec![0u8; output_len];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derivation failed: {e}")))?;

    let result = SecretBuffer::new(&output);
    output.zeroize();
    Ok(result)
}

/// Derive the 32-byte KDBX transformed key with Argon2.
///
/// # Errors
///
/// Same as [`derive_key`].
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &Argon2Params,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    let buf = derive_key(password, salt, params, OUTPUT_LEN)?;
    SecretBytes::from_slice(buf.expose())
}

// ---------------------------------------------------------------------------
// AES-KDF
// ---------------------------------------------------------------------------

/// Derive the KDBX transformed key with AES-KDF.
///
/// Encrypts both 16-byte halves of `key` `rounds` times with AES-256-ECB
/// keyed by `seed`, then hashes the result with SHA-256.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if `seed` is not 32 bytes.
pub fn derive_aes_kdf(
    key: &[u8; OUTPUT_LEN],
    seed: &[u8],
    rounds: u64,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    let cipher = aes::Aes256::new_from_slice(seed).map_err(|_| {
        CryptoError::KeyDerivation(format!(
            "AES-KDF seed must be 32 bytes, got {}",
            seed.len()
        ))
    })?;

    let (left, right) = key.split_at(16);
    let mut blocks = [
        aes::Block::clone_from_slice(left),
        aes::Block::clone_from_slice(right),
    ];
    for _ in 0..rounds {
        cipher.encrypt_blocks(&mut blocks);
    }

    let transformed = mac::sha256(&[blocks[0].as_slice(), blocks[1].as_slice()]);
    for block in &mut blocks {
        block.as_mut_slice().zeroize();
    }
    Ok(SecretBytes::new(transformed))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
