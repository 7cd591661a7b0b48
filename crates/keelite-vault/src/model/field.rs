//! Entry field values.
//!
//! - [`FieldValue`]: plain text or protected, with a uniform
//!   [`FieldValue::reveal_text`]
//! - [`ProtectedValue`]: bytes held XOR-masked with a random pad, so the
//!   plaintext never sits contiguously in memory between reveals

use std::fmt;

use keelite_crypto_core::rng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// ProtectedValue
// ---------------------------------------------------------------------------

/// A field value kept masked in memory and revealed on demand.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProtectedValue {
    masked: Vec<u8>,
    pad: Vec<u8>,
}

impl ProtectedValue {
    /// The empty value. Needs no pad.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            masked: Vec::new(),
            pad: Vec::new(),
        }
    }

    /// Mask `bytes` with a fresh CSPRNG pad.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if the CSPRNG fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let pad = rng::random_bytes(bytes.len())?;
        let masked = bytes.iter().zip(&pad).map(|(b, p)| b ^ p).collect();
        Ok(Self { masked, pad })
    }

    /// Mask a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if the CSPRNG fails.
    pub fn from_text(text: &str) -> Result<Self, VaultError> {
        Self::from_bytes(text.as_bytes())
    }

    /// Unmask into a buffer that is zeroized when dropped.
    #[must_use]
    pub fn reveal_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(
            self.masked
                .iter()
                .zip(&self.pad)
                .map(|(m, p)| m ^ p)
                .collect(),
        )
    }

    /// Unmask as text; invalid UTF-8 is replaced.
    #[must_use]
    pub fn reveal_text(&self) -> String {
        String::from_utf8_lossy(&self.reveal_bytes()).into_owned()
    }

    /// Length of the plaintext in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masked.len()
    }

    /// Whether the plaintext is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masked.is_empty()
    }
}

impl PartialEq for ProtectedValue {
    fn eq(&self, other: &Self) -> bool {
        *self.reveal_bytes() == *other.reveal_bytes()
    }
}

impl Eq for ProtectedValue {}

impl fmt::Debug for ProtectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProtectedValue(***)")
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// Value of one entry field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// Stored and serialized as plain text.
    PlainText(String),
    /// Masked in memory and in the XML (`Protected="True"`).
    Protected(ProtectedValue),
}

impl FieldValue {
    /// The field's text, whichever variant holds it.
    #[must_use]
    pub fn reveal_text(&self) -> String {
        match self {
            Self::PlainText(text) => text.clone(),
            Self::Protected(value) => value.reveal_text(),
        }
    }

    /// Whether the value is protected.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        matches!(self, Self::Protected(_))
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::PlainText(text)
    }
}
