//! Payload ciphers for the KDBX4 outer container.
//!
//! This module provides:
//! - [`PayloadCipher`]: the two ciphers a KDBX4 header may declare
//! - [`PayloadCipher::encrypt`] / [`PayloadCipher::decrypt`]: whole-payload
//!   transforms keyed by the 32-byte master key
//!
//! Integrity is not provided here: the KDBX4 HMAC block stream authenticates
//! the ciphertext before it ever reaches [`PayloadCipher::decrypt`].

use crate::error::CryptoError;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use serde::{Deserialize, Serialize};

/// Master key length for both ciphers (256 bits).
pub const KEY_LEN: usize = 32;

/// AES-256-CBC cipher UUID `31c1f2e6-bf71-4350-be58-05216afc5aff`.
const AES256_UUID: [u8; 16] = [
    0x31, 0xc1, 0xf2, 0xe6, 0xbf, 0x71, 0x43, 0x50, 0xbe, 0x58, 0x05, 0x21, 0x6a, 0xfc, 0x5a, 0xff,
];

/// ChaCha20 cipher UUID `d6038a2b-8b6f-4cb5-a524-339a31dbb59a`.
const CHACHA20_UUID: [u8; 16] = [
    0xd6, 0x03, 0x8a, 0x2b, 0x8b, 0x6f, 0x4c, 0xb5, 0xa5, 0x24, 0x33, 0x9a, 0x31, 0xdb, 0xb5, 0x9a,
];

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Cipher protecting the KDBX4 payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCipher {
    /// AES-256 in CBC mode with PKCS#7 padding, 16-byte IV.
    Aes256Cbc,
    /// ChaCha20 (RFC 7539 variant), 12-byte nonce.
    #[default]
    ChaCha20,
}

impl PayloadCipher {
    /// Cipher UUID as written in header field 2.
    #[must_use]
    pub const fn uuid(self) -> [u8; 16] {
        match self {
            Self::Aes256Cbc => AES256_UUID,
            Self::ChaCha20 => CHACHA20_UUID,
        }
    }

    /// Resolve a header cipher UUID.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedVersion` for any other UUID (Twofish
    /// included).
    pub fn from_uuid(uuid: &[u8]) -> Result<Self, CryptoError> {
        if uuid == AES256_UUID {
            Ok(Self::Aes256Cbc)
        } else if uuid == CHACHA20_UUID {
            Ok(Self::ChaCha20)
        } else {
            Err(CryptoError::UnsupportedVersion(format!(
                "cipher {}",
                hex_string(uuid)
            )))
        }
    }

    /// Length of the IV / nonce stored in header field 7.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        match self {
            Self::Aes256Cbc => 16,
            Self::ChaCha20 => 12,
        }
    }

    /// Encrypt a whole payload.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the key or IV has the wrong length.
    pub fn encrypt(
        self,
        key: &[u8; KEY_LEN],
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Aes256Cbc => {
                let cipher = Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::Encryption(format!("AES-256-CBC init: {e}")))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
            Self::ChaCha20 => {
                let mut out = plaintext.to_vec();
                apply_chacha20(key, iv, &mut out).map_err(CryptoError::Encryption)?;
                Ok(out)
            }
        }
    }

    /// Decrypt a whole payload.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` on a bad key/IV length, or on
    /// invalid PKCS#7 padding for AES-256-CBC.
    pub fn decrypt(
        self,
        key: &[u8; KEY_LEN],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Aes256Cbc => {
                let cipher = Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::Decryption(format!("AES-256-CBC init: {e}")))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| CryptoError::Decryption("invalid PKCS#7 padding".into()))
            }
            Self::ChaCha20 => {
                let mut out = ciphertext.to_vec();
                apply_chacha20(key, iv, &mut out).map_err(CryptoError::Decryption)?;
                Ok(out)
            }
        }
    }
}

/// XOR `buf` in place with the ChaCha20 keystream.
fn apply_chacha20(key: &[u8], nonce: &[u8], buf: &mut [u8]) -> Result<(), String> {
    let mut cipher = chacha20::ChaCha20::new_from_slices(key, nonce)
        .map_err(|e| format!("ChaCha20 init: {e}"))?;
    cipher
        .try_apply_keystream(buf)
        .map_err(|e| format!("ChaCha20 keystream: {e}"))
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn uuid_roundtrip_for_both_ciphers() {
        for cipher in [PayloadCipher::Aes256Cbc, PayloadCipher::ChaCha20] {
            assert_eq!(PayloadCipher::from_uuid(&cipher.uuid()).unwrap(), cipher);
        }
    }

    #[test]
    fn unknown_uuid_is_unsupported() {
        let twofish = [
            0xad, 0x68, 0xf2, 0x9f, 0x57, 0x6f, 0x4b, 0xb9, 0xa3, 0x6a, 0xd4, 0x7a, 0xf9, 0x65,
            0x34, 0x6c,
        ];
        let err = PayloadCipher::from_uuid(&twofish).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedVersion(_)));
        assert!(err.to_string().contains("ad68f29f"));
    }

    #[test]
    fn aes_cbc_pads_to_block_size() {
        let iv = [0u8; 16];
        let ct = PayloadCipher::Aes256Cbc.encrypt(&KEY, &iv, b"hello").unwrap();
        assert_eq!(ct.len(), 16);
        let ct = PayloadCipher::Aes256Cbc.encrypt(&KEY, &iv, &[0u8; 16]).unwrap();
        assert_eq!(ct.len(), 32);
    }

    #[test]
    fn aes_cbc_decrypt_restores_plaintext() {
        let iv = [7u8; 16];
        let ct = PayloadCipher::Aes256Cbc
            .encrypt(&KEY, &iv, b"kdbx payload")
            .unwrap();
        let pt = PayloadCipher::Aes256Cbc.decrypt(&KEY, &iv, &ct).unwrap();
        assert_eq!(pt, b"kdbx payload");
    }

    #[test]
    fn aes_cbc_wrong_key_fails_or_differs() {
        let iv = [7u8; 16];
        let ct = PayloadCipher::Aes256Cbc
            .encrypt(&KEY, &iv, b"kdbx payload")
            .unwrap();
        match PayloadCipher::Aes256Cbc.decrypt(&[0x43; 32], &iv, &ct) {
            Ok(pt) => assert_ne!(pt, b"kdbx payload"),
            Err(e) => assert!(matches!(e, CryptoError::Decryption(_))),
        }
    }

    #[test]
    fn aes_cbc_rejects_truncated_ciphertext() {
        let iv = [7u8; 16];
        let err = PayloadCipher::Aes256Cbc.decrypt(&KEY, &iv, &[1, 2, 3]);
        assert!(err.is_err());
    }

    #[test]
    fn chacha20_preserves_length() {
        let nonce = [1u8; 12];
        let ct = PayloadCipher::ChaCha20.encrypt(&KEY, &nonce, b"abc").unwrap();
        assert_eq!(ct.len(), 3);
        assert_ne!(ct, b"abc");
        let pt = PayloadCipher::ChaCha20.decrypt(&KEY, &nonce, &ct).unwrap();
        assert_eq!(pt, b"abc");
    }

    #[test]
    fn chacha20_rejects_wrong_nonce_length() {
        let err = PayloadCipher::ChaCha20.encrypt(&KEY, &[0u8; 16], b"abc");
        assert!(matches!(err, Err(CryptoError::Encryption(_))));
    }

    #[test]
    fn iv_lengths() {
        assert_eq!(PayloadCipher::Aes256Cbc.iv_len(), 16);
        assert_eq!(PayloadCipher::ChaCha20.iv_len(), 12);
        assert_eq!(PayloadCipher::default(), PayloadCipher::ChaCha20);
    }
}
