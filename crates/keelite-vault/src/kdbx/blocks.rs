//! KDBX4 HMAC block stream.
//!
//! The encrypted payload is split into blocks of `[hmac: 32][size: u32][data]`.
//! Each block's HMAC-SHA-256 covers `index (u64 LE) || size || data`, keyed
//! with `SHA-512(index || hmac_base_key)`. A zero-size block terminates the
//! stream.

use keelite_crypto_core::mac;
use zeroize::Zeroize;

use crate::error::VaultError;
use crate::kdbx::bytes::{put_sized, ByteReader};

/// Block payload size used when writing (1 MiB, as KeePass does).
pub const BLOCK_SIZE: usize = 1_048_576;

/// Block index whose key authenticates the outer header.
pub const HEADER_BLOCK_INDEX: u64 = u64::MAX;

/// Per-block HMAC key.
#[must_use]
pub fn block_key(index: u64, hmac_base_key: &[u8; 64]) -> [u8; 64] {
    mac::sha512(&[&index.to_le_bytes(), hmac_base_key])
}

fn block_hmac(index: u64, hmac_base_key: &[u8; 64], data: &[u8]) -> Result<[u8; 32], VaultError> {
    let mut key = block_key(index, hmac_base_key);
    let size = u32::try_from(data.len())
        .map_err(|_| VaultError::Corrupted(format!("block too large: {} bytes", data.len())))?;
    let tag = mac::hmac_sha256(&key, &[&index.to_le_bytes(), &size.to_le_bytes(), data]);
    key.zeroize();
    Ok(tag?)
}

/// Verify and concatenate the blocks.
///
/// # Errors
///
/// Returns [`VaultError::Corrupted`] on truncation or an HMAC mismatch.
pub fn read_blocks(data: &[u8], hmac_base_key: &[u8; 64]) -> Result<Vec<u8>, VaultError> {
    let mut r = ByteReader::new(data, VaultError::Corrupted);
    let mut out = Vec::with_capacity(data.len());
    let mut index: u64 = 0;
    loop {
        let tag = r.array::<32>()?;
        let block = r.sized()?;
        let mut key = block_key(index, hmac_base_key);
        let size = u32::try_from(block.len())
            .map_err(|_| VaultError::Corrupted("block size overflow".into()))?;
        let valid = mac::verify_hmac_sha256(
            &key,
            &[&index.to_le_bytes(), &size.to_le_bytes(), block],
            &tag,
        );
        key.zeroize();
        if !valid? {
            return Err(VaultError::Corrupted(format!("block {index} failed authentication")));
        }
        if block.is_empty() {
            break;
        }
        out.extend_from_slice(block);
        index = index
            .checked_add(1)
            .ok_or_else(|| VaultError::Corrupted("too many blocks".into()))?;
    }
    Ok(out)
}

/// Split `payload` into authenticated blocks, ending with an empty block.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the HMAC key is rejected.
pub fn write_blocks(payload: &[u8], hmac_base_key: &[u8; 64]) -> Result<Vec<u8>, VaultError> {
    let mut out = Vec::with_capacity(payload.len().saturating_add(128));
    let mut index: u64 = 0;
    for chunk in payload.chunks(BLOCK_SIZE).chain(std::iter::once(&[][..])) {
        let tag = block_hmac(index, hmac_base_key, chunk)?;
        out.extend_from_slice(&tag);
        put_sized(&mut out, chunk)?;
        index = index.saturating_add(1);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 64] = [0x5A; 64];

    #[test]
    fn blocks_roundtrip_across_boundary() {
        let payload = vec![0xAB; BLOCK_SIZE + 10];
        let stream = write_blocks(&payload, &KEY).unwrap();
        assert_eq!(read_blocks(&stream, &KEY).unwrap(), payload);
    }

    #[test]
    fn empty_payload_is_single_terminator() {
        let stream = write_blocks(&[], &KEY).unwrap();
        assert_eq!(stream.len(), 36);
        assert!(read_blocks(&stream, &KEY).unwrap().is_empty());
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let mut stream = write_blocks(b"hello blocks", &KEY).unwrap();
        stream[40] ^= 1;
        assert!(matches!(read_blocks(&stream, &KEY), Err(VaultError::Corrupted(_))));
    }

    #[test]
    fn wrong_key_is_corruption() {
        let stream = write_blocks(b"hello blocks", &KEY).unwrap();
        assert!(matches!(
            read_blocks(&stream, &[0u8; 64]),
            Err(VaultError::Corrupted(_))
        ));
    }

    #[test]
    fn missing_terminator_is_corruption() {
        let stream = write_blocks(b"hello", &KEY).unwrap();
        assert!(read_blocks(&stream[..stream.len() - 36], &KEY).is_err());
    }

    #[test]
    fn header_key_differs_from_block_zero() {
        assert_ne!(block_key(HEADER_BLOCK_INDEX, &KEY), block_key(0, &KEY));
    }
}
