//! Vault credentials and key-file processing.
//!
//! The composite key is `SHA-256(SHA-256(password) || key_file_hash)`, with
//! the key-file term omitted when no key file is used. Key files follow the
//! KeePass rules, tried in order:
//!
//! 1. XML key file (`<KeyFile>`): version 1.0 base64 `<Data>`, version 2.0
//!    hex `<Data Hash="…">` with a 4-byte SHA-256 check
//! 2. exactly 32 bytes: used as the key
//! 3. exactly 64 hex characters: decoded
//! 4. anything else: SHA-256 of the file

use std::fmt;

use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};
use keelite_crypto_core::mac;
use keelite_crypto_core::memory::{SecretBuffer, SecretBytes};
use quick_xml::events::Event;
use quick_xml::Reader;
use zeroize::Zeroizing;

use crate::error::VaultError;

/// How the caller supplies key-file material.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum KeyFileInput {
    /// No key file.
    #[default]
    None,
    /// Base64 of a key-file hash (as remembered in a record). An empty string
    /// means no key file. A value that does not decode to 32 bytes is treated
    /// as the base64 of a whole key file.
    HashBase64(String),
    /// Raw key-file bytes.
    Raw(Vec<u8>),
}

impl KeyFileInput {
    /// Input from an optional remembered hash, `None` and `""` both meaning no
    /// key file.
    #[must_use]
    pub fn from_remembered(hash: Option<&str>) -> Self {
        match hash {
            Some(h) if !h.trim().is_empty() => Self::HashBase64(h.to_owned()),
            _ => Self::None,
        }
    }
}

impl fmt::Debug for KeyFileInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("KeyFileInput::None"),
            Self::HashBase64(_) => f.write_str("KeyFileInput::HashBase64(***)"),
            Self::Raw(_) => f.write_str("KeyFileInput::Raw(***)"),
        }
    }
}

/// Password plus optional key-file hash, retained by an unlocked document.
#[derive(Clone)]
pub struct Credentials {
    password: SecretBuffer,
    key_file_hash: Option<SecretBytes<32>>,
}

impl Credentials {
    /// Build credentials from a UTF-8 password and key-file input.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if a remembered hash is not base64
    /// or an XML key file is malformed.
    pub fn new(password: &str, key_file: &KeyFileInput) -> Result<Self, VaultError> {
        let key_file_hash = match key_file {
            KeyFileInput::None => None,
            KeyFileInput::HashBase64(encoded) if encoded.trim().is_empty() => None,
            KeyFileInput::HashBase64(encoded) => {
                let decoded = Zeroizing::new(
                    BASE64
                        .decode(encoded.trim().as_bytes())
                        .map_err(|e| VaultError::Validation(format!("key file hash: {e}")))?,
                );
                Some(hash_key_file(&decoded)?)
            }
            KeyFileInput::Raw(bytes) => Some(hash_key_file(bytes)?),
        };
        Ok(Self {
            password: SecretBuffer::new(password.as_bytes()),
            key_file_hash,
        })
    }

    /// Whether a key file contributes to the composite key.
    #[must_use]
    pub const fn has_key_file(&self) -> bool {
        self.key_file_hash.is_some()
    }

    /// Base64 of the processed key-file hash, suitable for remembering.
    #[must_use]
    pub fn key_file_hash_base64(&self) -> Option<String> {
        self.key_file_hash
            .as_ref()
            .map(|hash| BASE64.encode(hash.expose()))
    }

    /// `SHA-256(SHA-256(password) || key_file_hash?)`.
    #[must_use]
    pub fn composite_key(&self) -> SecretBytes<32> {
        let password_hash = SecretBytes::new(mac::sha256(&[self.password.expose()]));
        let composite = match &self.key_file_hash {
            Some(key) => mac::sha256(&[password_hash.expose(), key.expose()]),
            None => mac::sha256(&[password_hash.expose()]),
        };
        SecretBytes::new(composite)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password)
            .field("key_file", &self.has_key_file())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Key files
// ---------------------------------------------------------------------------

/// Reduce key-file bytes to the 32-byte key used in the composite key.
///
/// # Errors
///
/// Returns [`VaultError::Validation`] for an XML key file with bad data or a
/// failing hash check.
pub fn hash_key_file(bytes: &[u8]) -> Result<SecretBytes<32>, VaultError> {
    if let Some(key) = parse_xml_key_file(bytes)? {
        return Ok(key);
    }
    if let Ok(raw) = <[u8; 32]>::try_from(bytes) {
        return Ok(SecretBytes::new(raw));
    }
    if bytes.len() == 64 {
        if let Ok(decoded) = HEXLOWER_PERMISSIVE.decode(bytes) {
            let decoded = Zeroizing::new(decoded);
            return Ok(SecretBytes::from_slice(&decoded)?);
        }
    }
    Ok(SecretBytes::new(mac::sha256(&[bytes])))
}

/// `Ok(None)` when the bytes are not an XML key file at all.
fn parse_xml_key_file(bytes: &[u8]) -> Result<Option<SecretBytes<32>>, VaultError> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Ok(None);
    };
    if !text.contains("<KeyFile") {
        return Ok(None);
    }

    let mut reader = Reader::from_str(text);
    let mut path: Vec<String> = Vec::new();
    let mut version = String::new();
    let mut data = Zeroizing::new(String::new());
    let mut data_hash: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "Data" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"Hash" {
                            data_hash = Some(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| VaultError::Validation(format!("key file: {e}")))?;
                match path.last().map(String::as_str) {
                    Some("Version") => version.push_str(value.trim()),
                    Some("Data") => data.push_str(&value),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return Ok(None),
        }
    }

    let compact: Zeroizing<String> =
        Zeroizing::new(data.chars().filter(|c| !c.is_whitespace()).collect());
    if compact.is_empty() {
        return Ok(None);
    }

    if version.starts_with("2.") {
        let decoded = Zeroizing::new(
            HEXLOWER_PERMISSIVE
                .decode(compact.as_bytes())
                .map_err(|e| VaultError::Validation(format!("key file data: {e}")))?,
        );
        if let Some(expected) = data_hash {
            let digest = mac::sha256(&[&decoded]);
            let actual = data_encoding::HEXUPPER.encode(digest.get(..4).unwrap_or_default());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(VaultError::Validation("key file hash mismatch".into()));
            }
        }
        return Ok(Some(SecretBytes::from_slice(&decoded)?));
    }

    let decoded = Zeroizing::new(
        BASE64
            .decode(compact.as_bytes())
            .map_err(|e| VaultError::Validation(format!("key file data: {e}")))?,
    );
    Ok(Some(SecretBytes::from_slice(&decoded)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_only_composite_is_double_sha256() {
        let credentials = Credentials::new("p1", &KeyFileInput::None).unwrap();
        let expected = mac::sha256(&[&mac::sha256(&[b"p1"])]);
        assert_eq!(credentials.composite_key().expose(), &expected);
        assert!(!credentials.has_key_file());
    }

    #[test]
    fn empty_hash_means_no_key_file() {
        let a = Credentials::new("p", &KeyFileInput::HashBase64(String::new())).unwrap();
        assert!(!a.has_key_file());
        assert_eq!(KeyFileInput::from_remembered(Some("  ")), KeyFileInput::None);
        assert_eq!(KeyFileInput::from_remembered(None), KeyFileInput::None);
    }

    #[test]
    fn hash_base64_of_32_bytes_is_used_directly() {
        let hash = [0x11u8; 32];
        let credentials =
            Credentials::new("p", &KeyFileInput::HashBase64(BASE64.encode(&hash))).unwrap();
        assert_eq!(credentials.key_file_hash_base64().unwrap(), BASE64.encode(&hash));
    }

    #[test]
    fn hash_base64_of_whole_file_matches_raw() {
        let file = b"some arbitrary key file content".to_vec();
        let from_raw = Credentials::new("p", &KeyFileInput::Raw(file.clone())).unwrap();
        let from_b64 =
            Credentials::new("p", &KeyFileInput::HashBase64(BASE64.encode(&file))).unwrap();
        assert_eq!(
            from_raw.composite_key().expose(),
            from_b64.composite_key().expose()
        );
    }

    #[test]
    fn invalid_base64_is_validation_error() {
        let err = Credentials::new("p", &KeyFileInput::HashBase64("!!!".into())).unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn arbitrary_file_is_hashed() {
        let key = hash_key_file(b"hello").unwrap();
        assert_eq!(key.expose(), &mac::sha256(&[b"hello"]));
    }

    #[test]
    fn hex_file_is_decoded() {
        let hex = "ab".repeat(32);
        let key = hash_key_file(hex.as_bytes()).unwrap();
        assert_eq!(key.expose(), &[0xAB; 32]);
    }

    #[test]
    fn xml_v1_key_file() {
        let data = BASE64.encode(&[0x22u8; 32]);
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<KeyFile><Meta><Version>1.00</Version></Meta><Key><Data>{data}</Data></Key></KeyFile>"
        );
        assert_eq!(hash_key_file(xml.as_bytes()).unwrap().expose(), &[0x22; 32]);
    }

    #[test]
    fn xml_v2_key_file_checks_hash() {
        let key = [0x33u8; 32];
        let hash = data_encoding::HEXUPPER.encode(&mac::sha256(&[&key])[..4]);
        let hex = data_encoding::HEXUPPER.encode(&key);
        let xml = format!(
            "<KeyFile><Meta><Version>2.0</Version></Meta><Key><Data Hash=\"{hash}\">\n  {} {}\n</Data></Key></KeyFile>",
            &hex[..32],
            &hex[32..]
        );
        assert_eq!(hash_key_file(xml.as_bytes()).unwrap().expose(), &key);

        let bad = xml.replace(&hash, "00000000");
        assert!(matches!(hash_key_file(bad.as_bytes()), Err(VaultError::Validation(_))));
    }

    #[test]
    fn debug_hides_secrets() {
        let credentials = Credentials::new("hunter2", &KeyFileInput::None).unwrap();
        assert!(!format!("{credentials:?}").contains("hunter2"));
        let input = KeyFileInput::Raw(b"secret".to_vec());
        assert!(!format!("{input:?}").contains("secret"));
    }
}
