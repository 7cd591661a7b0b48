//! Fuzz target for stored record validation.
//!
//! # Usage
//!
//! ```sh
//! cd crates/keelite-vault
//! cargo +nightly fuzz run record_json -- -max_len=8192
//! ```

#![no_main]

use keelite_vault::records::Record;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = serde_json::from_slice::<Record>(data) {
        // Anything accepted must serialize again.
        assert!(serde_json::to_vec(&record).is_ok());
    }
});
