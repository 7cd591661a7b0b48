//! Fuzz target for the decrypted payload: inner header followed by XML.
//!
//! Feeds arbitrary bytes to `InnerHeader::parse` and the XML reader. Must
//! never panic.
//!
//! # Usage
//!
//! ```sh
//! cd crates/keelite-vault
//! cargo +nightly fuzz run inner_payload -- -max_len=16384
//! ```

#![no_main]

use keelite_crypto_core::{InnerStream, InnerStreamAlgorithm};
use keelite_vault::kdbx::inner::InnerHeader;
use keelite_vault::kdbx::xml;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((_, rest)) = InnerHeader::parse(data) else {
        return;
    };
    // Fixed key: only the parser is under test here.
    if let Ok(mut stream) = InnerStream::new(InnerStreamAlgorithm::ChaCha20, &[7u8; 64]) {
        let _ = xml::read(rest, &mut stream);
    }
});
