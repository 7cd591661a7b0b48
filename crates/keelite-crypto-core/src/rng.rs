//! Cryptographically secure randomness.
//!
//! Every random value in the workspace is drawn from the operating system
//! CSPRNG through this module.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Size of the `u32` value space.
const U32_SPACE: f64 = 4_294_967_296.0;

/// Fill `buf` with CSPRNG output.
///
/// # Errors
///
/// Returns `CryptoError::Random` if the OS random source fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Random(format!("CSPRNG fill failed: {e}")))
}

/// Return `len` bytes of CSPRNG output.
///
/// # Errors
///
/// Returns `CryptoError::Random` if the OS random source fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = vec![0u8; len];
    fill_random(&mut out)?;
    Ok(out)
}

/// Return a fixed-size array of CSPRNG output.
///
/// # Errors
///
/// Returns `CryptoError::Random` if the OS random source fails.
pub fn random_array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    fill_random(&mut out)?;
    Ok(out)
}

/// Map four bytes (big-endian `u32`) onto the unit interval `[0, 1)`.
#[must_use]
pub fn unit_from_bytes(bytes: [u8; 4]) -> f64 {
    f64::from(u32::from_be_bytes(bytes)) / U32_SPACE
}

/// Uniform `f64` in `[0, 1)` built from 4 CSPRNG bytes.
///
/// # Errors
///
/// Returns `CryptoError::Random` if the OS random source fails.
pub fn random_unit() -> Result<f64, CryptoError> {
    Ok(unit_from_bytes(random_array::<4>()?))
}

/// Uniform integer in the inclusive range spanned by `from` and `to`.
///
/// The bounds may be given in either order.
#[must_use]
pub fn random_int(from: i64, to: i64) -> i64 {
    let (min, max) = if from <= to { (from, to) } else { (to, from) };
    OsRng.gen_range(min..=max)
}

/// Pick one element of `values` uniformly at random.
///
/// # Errors
///
/// Returns `CryptoError::Random` if `values` is empty.
pub fn random_element<T>(values: &[T]) -> Result<&T, CryptoError> {
    if values.is_empty() {
        return Err(CryptoError::Random("cannot pick from an empty slice".into()));
    }
    let index = OsRng.gen_range(0..values.len());
    values
        .get(index)
        .ok_or_else(|| CryptoError::Random("random index out of bounds".into()))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
