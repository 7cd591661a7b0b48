//! `keelite-crypto-core`: cryptographic primitives for the keelite KDBX engine.
//!
//! Pure computation: no I/O, no async. Every random byte comes from [`rng`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;
pub mod rng;

pub mod kdf;
pub mod mac;
pub mod stream;
pub mod symmetric;

pub use error::CryptoError;
pub use kdf::{derive, derive_aes_kdf, derive_key, Argon2Params, Argon2Variant, KdfPreset};
pub use memory::{SecretBuffer, SecretBytes};
pub use stream::{InnerStream, InnerStreamAlgorithm};
pub use symmetric::PayloadCipher;
