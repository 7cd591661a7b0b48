//! KDBX4 inner header: protected-stream parameters and the binary pool.
//!
//! Fields are `u8` id, `u32` length, data: 1 stream id (`u32`), 2 stream key,
//! 3 binary (one flag byte, bit 0 = protected, then content), 0 end.

use keelite_crypto_core::InnerStreamAlgorithm;
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::kdbx::bytes::{put_sized, ByteReader};
use crate::model::Attachment;

const FIELD_END: u8 = 0;
const FIELD_STREAM_ID: u8 = 1;
const FIELD_STREAM_KEY: u8 = 2;
const FIELD_BINARY: u8 = 3;

const BINARY_PROTECTED: u8 = 0x01;

/// Parsed inner header.
pub struct InnerHeader {
    pub stream: InnerStreamAlgorithm,
    pub stream_key: Zeroizing<Vec<u8>>,
    pub binaries: Vec<Attachment>,
}

impl InnerHeader {
    /// Parse the inner header, returning it and the XML that follows.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Corrupted`] on truncation or a missing stream field.
    /// - [`VaultError::UnsupportedVersion`] for an unknown stream id.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), VaultError> {
        let mut r = ByteReader::new(data, VaultError::Corrupted);
        let mut stream = None;
        let mut stream_key = None;
        let mut binaries = Vec::new();
        loop {
            let id = r.u8()?;
            let value = r.sized()?;
            match id {
                FIELD_END => break,
                FIELD_STREAM_ID => {
                    let raw = <[u8; 4]>::try_from(value)
                        .map_err(|_| VaultError::Corrupted("stream id length".into()))?;
                    stream = Some(InnerStreamAlgorithm::from_id(u32::from_le_bytes(raw))?);
                }
                FIELD_STREAM_KEY => stream_key = Some(Zeroizing::new(value.to_vec())),
                FIELD_BINARY => {
                    let (flags, content) = value
                        .split_first()
                        .ok_or_else(|| VaultError::Corrupted("empty binary field".into()))?;
                    binaries.push(Attachment {
                        data: content.to_vec(),
                        protected: flags & BINARY_PROTECTED != 0,
                    });
                }
                other => tracing::debug!(field = other, "skipping inner header field"),
            }
        }
        let header = Self {
            stream: stream.ok_or_else(|| VaultError::Corrupted("inner stream id missing".into()))?,
            stream_key: stream_key
                .ok_or_else(|| VaultError::Corrupted("inner stream key missing".into()))?,
            binaries,
        };
        Ok((header, r.remaining()))
    }

    /// Serialize the inner header.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Corrupted`] if a field exceeds `u32` length.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), VaultError> {
        out.push(FIELD_STREAM_ID);
        put_sized(out, &self.stream.id().to_le_bytes())?;
        out.push(FIELD_STREAM_KEY);
        put_sized(out, &self.stream_key)?;
        for binary in &self.binaries {
            let mut value = Vec::with_capacity(binary.data.len().saturating_add(1));
            value.push(if binary.protected { BINARY_PROTECTED } else { 0 });
            value.extend_from_slice(&binary.data);
            out.push(FIELD_BINARY);
            put_sized(out, &value)?;
        }
        out.push(FIELD_END);
        put_sized(out, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_header_roundtrip_with_binaries() {
        let header = InnerHeader {
            stream: InnerStreamAlgorithm::ChaCha20,
            stream_key: Zeroizing::new(vec![4u8; 64]),
            binaries: vec![
                Attachment { data: b"file".to_vec(), protected: true },
                Attachment { data: Vec::new(), protected: false },
            ],
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes.extend_from_slice(b"<xml/>");

        let (parsed, rest) = InnerHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.stream, InnerStreamAlgorithm::ChaCha20);
        assert_eq!(parsed.stream_key.as_slice(), &[4u8; 64]);
        assert_eq!(parsed.binaries, header.binaries);
        assert_eq!(rest, b"<xml/>");
    }

    #[test]
    fn missing_stream_key_is_corruption() {
        let mut bytes = vec![FIELD_STREAM_ID];
        put_sized(&mut bytes, &3u32.to_le_bytes()).unwrap();
        bytes.push(FIELD_END);
        put_sized(&mut bytes, &[]).unwrap();
        assert!(matches!(InnerHeader::parse(&bytes), Err(VaultError::Corrupted(_))));
    }

    #[test]
    fn unknown_stream_is_unsupported() {
        let mut bytes = vec![FIELD_STREAM_ID];
        put_sized(&mut bytes, &9u32.to_le_bytes()).unwrap();
        assert!(matches!(
            InnerHeader::parse(&bytes),
            Err(VaultError::UnsupportedVersion(_))
        ));
    }
}
