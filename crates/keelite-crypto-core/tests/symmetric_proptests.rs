#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the KDBX payload ciphers and inner stream.

use keelite_crypto_core::stream::{InnerStream, InnerStreamAlgorithm};
use keelite_crypto_core::symmetric::{PayloadCipher, KEY_LEN};
use proptest::prelude::*;

/// Fixed key for property tests.
const PROP_KEY: [u8; KEY_LEN] = [0xCC; KEY_LEN];

fn any_cipher() -> impl Strategy<Value = PayloadCipher> {
    prop_oneof![Just(PayloadCipher::Aes256Cbc), Just(PayloadCipher::ChaCha20)]
}

proptest! {
    /// Encrypt→decrypt recovers the plaintext for both ciphers.
    #[test]
    fn encrypt_decrypt_roundtrip(
        cipher in any_cipher(),
        plaintext in proptest::collection::vec(any::<u8>(), 0..4096),
        iv_seed in any::<u8>(),
    ) {
        let iv = vec![iv_seed; cipher.iv_len()];
        let ct = cipher.encrypt(&PROP_KEY, &iv, &plaintext).expect("encrypt");
        let pt = cipher.decrypt(&PROP_KEY, &iv, &ct).expect("decrypt");
        prop_assert_eq!(pt, plaintext);
    }

    /// A different IV yields different ciphertext.
    #[test]
    fn iv_changes_ciphertext(
        cipher in any_cipher(),
        plaintext in proptest::collection::vec(any::<u8>(), 1..512),
    ) {
        let a = cipher.encrypt(&PROP_KEY, &vec![0u8; cipher.iv_len()], &plaintext).unwrap();
        let b = cipher.encrypt(&PROP_KEY, &vec![1u8; cipher.iv_len()], &plaintext).unwrap();
        prop_assert_ne!(a, b);
    }

    /// Splitting a value across calls does not change the inner keystream.
    #[test]
    fn inner_stream_split_invariant(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        split in any::<prop::sample::Index>(),
    ) {
        let key = [3u8; 64];
        let mut whole = data.clone();
        InnerStream::new(InnerStreamAlgorithm::ChaCha20, &key).unwrap().apply(&mut whole).unwrap();

        let at = if data.is_empty() { 0 } else { split.index(data.len()) };
        let mut parts = data;
        let (head, tail) = parts.split_at_mut(at);
        let mut stream = InnerStream::new(InnerStreamAlgorithm::ChaCha20, &key).unwrap();
        stream.apply(head).unwrap();
        stream.apply(tail).unwrap();
        prop_assert_eq!(parts, whole);
    }
}
