//! Fuzz target for the KDBX4 outer header parser.
//!
//! Feeds arbitrary bytes to `inspect_header`. Must never panic. Decryption
//! is not attempted: a header that parses may carry any KDF cost.
//!
//! # Usage
//!
//! ```sh
//! # Install cargo-fuzz (requires nightly Rust):
//! cargo +nightly install cargo-fuzz
//!
//! # Run from the keelite-vault crate directory:
//! cd crates/keelite-vault
//! cargo +nightly fuzz run outer_header -- -max_len=4096
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = keelite_vault::kdbx::inspect_header(data) {
        // A parsed header must serialize back to bytes.
        let _ = header.to_bytes();
    }
});
