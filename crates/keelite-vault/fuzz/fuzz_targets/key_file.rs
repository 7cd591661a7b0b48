//! Fuzz target for key-file hashing (XML, 32-byte raw, 64-char hex, other).
//!
//! # Usage
//!
//! ```sh
//! cd crates/keelite-vault
//! cargo +nightly fuzz run key_file -- -max_len=2048
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must never panic, regardless of input.
    let _ = keelite_vault::kdbx::hash_key_file(data);
});
