//! KDBX4 container codec.
//!
//! Layout of a file:
//!
//! ```text
//! outer header | SHA-256(header) | HMAC(header) | HMAC block stream
//! ```
//!
//! The block stream carries the encrypted (and optionally gzipped) payload:
//! the inner header followed by the XML document. [`unlock`] and [`save`]
//! run the KDF on the blocking pool; [`decode`] and [`encode`] are the
//! synchronous cores.

pub(crate) mod bytes;

pub mod blocks;
pub mod credentials;
pub mod header;
pub mod inner;
pub mod xml;

use std::io::{Read, Write};
use std::time::Instant;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use keelite_crypto_core::memory::SecretBytes;
use keelite_crypto_core::{
    kdf, mac, rng, InnerStream, InnerStreamAlgorithm, KdfPreset, PayloadCipher,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::VaultError;
use crate::model::{self, Document, Group, Metadata};

pub use credentials::{hash_key_file, Credentials, KeyFileInput};
pub use header::{AesKdfParams, KdfParameters, OuterHeader};

use blocks::HEADER_BLOCK_INDEX;
use inner::InnerHeader;

const SEED_LEN: usize = 32;
const KDF_SALT_LEN: usize = 32;
const INNER_KEY_LEN: usize = 64;

/// Container parameters applied on every save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Payload cipher.
    pub cipher: PayloadCipher,
    /// Gzip the payload before encryption.
    pub compression: bool,
    /// KDF and its cost. A fresh salt is drawn on every save.
    pub kdf: KdfParameters,
    /// Opaque header field 12, carried through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_custom_data: Option<Vec<u8>>,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            cipher: PayloadCipher::default(),
            compression: true,
            kdf: KdfParameters::Argon2(KdfPreset::Balanced.default_params()),
            public_custom_data: None,
        }
    }
}

/// Master key and HMAC base key derived from one header.
struct Keys {
    master: SecretBytes<32>,
    hmac_base: Zeroizing<[u8; 64]>,
}

fn derive_keys(
    credentials: &Credentials,
    master_seed: &[u8; 32],
    kdf_params: &KdfParameters,
    kdf_salt: &[u8],
) -> Result<Keys, VaultError> {
    let composite = credentials.composite_key();
    let transformed = match kdf_params {
        KdfParameters::Argon2(params) => kdf::derive(composite.expose(), kdf_salt, params)?,
        KdfParameters::Aes(params) => {
            kdf::derive_aes_kdf(composite.expose(), kdf_salt, params.rounds)?
        }
    };
    Ok(Keys {
        master: SecretBytes::new(mac::sha256(&[master_seed, transformed.expose()])),
        hmac_base: Zeroizing::new(mac::sha512(&[master_seed, transformed.expose(), &[1u8]])),
    })
}

/// Parse the outer header without credentials.
///
/// # Errors
///
/// Same header errors as [`decode`].
pub fn inspect_header(data: &[u8]) -> Result<OuterHeader, VaultError> {
    OuterHeader::parse(data)
}

/// Decrypt and parse a KDBX4 file.
///
/// # Errors
///
/// - [`VaultError::MalformedHeader`] for a foreign file or a header whose
///   checksum does not match.
/// - [`VaultError::UnsupportedVersion`] for an unknown cipher, KDF or inner
///   stream.
/// - [`VaultError::InvalidCredentials`] when the header HMAC does not verify
///   (wrong password or key file).
/// - [`VaultError::Corrupted`] when the payload fails authentication,
///   decryption or decompression.
/// - [`VaultError::Xml`] for a malformed inner document.
pub fn decode(data: &[u8], credentials: &Credentials) -> Result<Document, VaultError> {
    // Step 1: Outer header and its checksum.
    let header = OuterHeader::parse(data)?;
    let header_len = header.raw().len();
    let rest = data.get(header_len..).unwrap_or_default();
    let (checksum, rest) = split_array::<32>(rest)
        .ok_or_else(|| VaultError::MalformedHeader("missing header checksum".into()))?;
    if mac::sha256(&[header.raw()]) != checksum {
        return Err(VaultError::MalformedHeader("header checksum mismatch".into()));
    }
    let (header_hmac, block_stream) = split_array::<32>(rest)
        .ok_or_else(|| VaultError::MalformedHeader("missing header HMAC".into()))?;

    // Step 2: Keys, then authenticate the header.
    let keys = derive_keys(
        credentials,
        &header.master_seed,
        &header.kdf,
        &header.kdf_salt,
    )?;
    let mut header_key = blocks::block_key(HEADER_BLOCK_INDEX, &keys.hmac_base);
    let authentic = mac::verify_hmac_sha256(&header_key, &[header.raw()], &header_hmac);
    header_key.zeroize();
    if !authentic? {
        return Err(VaultError::InvalidCredentials);
    }

    // Step 3: Blocks, decryption, decompression.
    let encrypted = blocks::read_blocks(block_stream, &keys.hmac_base)?;
    let decrypted = Zeroizing::new(
        header
            .cipher
            .decrypt(keys.master.expose(), &header.iv, &encrypted)
            .map_err(|e| VaultError::Corrupted(e.to_string()))?,
    );
    let payload = if header.compressed {
        let mut out = Zeroizing::new(Vec::with_capacity(decrypted.len().saturating_mul(4)));
        GzDecoder::new(decrypted.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| VaultError::Corrupted(format!("gzip: {e}")))?;
        out
    } else {
        decrypted
    };

    // Step 4: Inner header and XML.
    let (inner, xml_bytes) = InnerHeader::parse(&payload)?;
    let mut stream = InnerStream::new(inner.stream, &inner.stream_key)?;
    let content = xml::read(xml_bytes, &mut stream)?;

    let settings = VaultSettings {
        cipher: header.cipher,
        compression: header.compressed,
        kdf: header.kdf,
        public_custom_data: header.public_custom_data,
    };
    let mut document = Document::new(content.root, content.meta, settings, credentials.clone());
    document.deleted_objects = content.deleted_objects;
    document.binaries = inner.binaries;
    Ok(document)
}

/// Serialize and encrypt a document with fresh seed, IV, salt and inner
/// stream key.
///
/// # Errors
///
/// - [`VaultError::Crypto`] if the CSPRNG, KDF or cipher fails.
/// - [`VaultError::Xml`] if the document cannot be written.
pub fn encode(document: &Document) -> Result<Vec<u8>, VaultError> {
    let settings = &document.settings;

    // Step 1: Fresh randomness.
    let master_seed = rng::random_array::<SEED_LEN>()?;
    let iv = rng::random_bytes(settings.cipher.iv_len())?;
    let kdf_salt = rng::random_bytes(KDF_SALT_LEN)?;
    let inner = InnerHeader {
        stream: InnerStreamAlgorithm::ChaCha20,
        stream_key: Zeroizing::new(rng::random_bytes(INNER_KEY_LEN)?),
        binaries: document.binaries.clone(),
    };

    // Step 2: Outer header, checksum, HMAC.
    let header = OuterHeader::for_write(
        settings.cipher,
        settings.compression,
        master_seed,
        iv,
        settings.kdf.clone(),
        kdf_salt,
        settings.public_custom_data.clone(),
    );
    let header_bytes = header.to_bytes()?;
    let keys = derive_keys(
        document.credentials(),
        &header.master_seed,
        &header.kdf,
        &header.kdf_salt,
    )?;
    let mut header_key = blocks::block_key(HEADER_BLOCK_INDEX, &keys.hmac_base);
    let header_hmac = mac::hmac_sha256(&header_key, &[&header_bytes]);
    header_key.zeroize();
    let header_hmac = header_hmac?;

    // Step 3: Inner header and XML.
    let mut payload = Zeroizing::new(Vec::new());
    inner.write(&mut payload)?;
    let mut stream = InnerStream::new(inner.stream, &inner.stream_key)?;
    let xml_bytes = Zeroizing::new(xml::write(
        &document.meta,
        &document.root,
        &document.deleted_objects,
        &mut stream,
    )?);
    payload.extend_from_slice(&xml_bytes);

    // Step 4: Compress, encrypt, block.
    let plaintext = if settings.compression {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        Zeroizing::new(encoder.finish()?)
    } else {
        payload
    };
    let encrypted = header
        .cipher
        .encrypt(keys.master.expose(), &header.iv, &plaintext)?;
    let block_stream = blocks::write_blocks(&encrypted, &keys.hmac_base)?;

    let mut out = Vec::with_capacity(
        header_bytes
            .len()
            .saturating_add(64)
            .saturating_add(block_stream.len()),
    );
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&mac::sha256(&[&header_bytes]));
    out.extend_from_slice(&header_hmac);
    out.extend_from_slice(&block_stream);
    Ok(out)
}

/// Decrypt a KDBX4 file on the blocking pool.
///
/// # Errors
///
/// Same as [`decode`], plus [`VaultError::Task`] if the blocking task fails.
pub async fn unlock(data: &[u8], credentials: &Credentials) -> Result<Document, VaultError> {
    let data = data.to_vec();
    let credentials = credentials.clone();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || decode(&data, &credentials)).await?;
    match &result {
        Ok(document) => tracing::info!(
            elapsed_ms = started.elapsed().as_millis(),
            entries = count_entries(&document.root),
            "vault unlocked"
        ),
        Err(VaultError::InvalidCredentials) => tracing::warn!("vault unlock rejected credentials"),
        Err(e) => tracing::warn!("vault unlock failed: {e}"),
    }
    result
}

/// Encrypt a document on the blocking pool.
///
/// # Errors
///
/// Same as [`encode`], plus [`VaultError::Task`] if the blocking task fails.
pub async fn save(document: &Document) -> Result<Vec<u8>, VaultError> {
    let document = document.clone();
    let started = Instant::now();
    let bytes = tokio::task::spawn_blocking(move || encode(&document)).await??;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis(),
        len = bytes.len(),
        "vault saved"
    );
    Ok(bytes)
}

/// Build an empty vault. The root group takes the vault name; the recycle
/// bin is enabled and created on first removal.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if a UUID cannot be generated.
pub fn create(
    name: &str,
    credentials: Credentials,
    settings: VaultSettings,
) -> Result<Document, VaultError> {
    let mut meta = Metadata::new(name);
    meta.generator = model::GENERATOR.to_owned();
    let root = Group::new(model::new_uuid()?, name);
    tracing::debug!(root = %root.uuid, "created vault document");
    Ok(Document::new(root, meta, settings, credentials))
}

fn count_entries(group: &Group) -> usize {
    group
        .groups
        .iter()
        .map(count_entries)
        .fold(group.entries.len(), usize::saturating_add)
}

fn split_array<const N: usize>(data: &[u8]) -> Option<([u8; N], &[u8])> {
    let head = data.get(..N)?;
    let tail = data.get(N..)?;
    Some((<[u8; N]>::try_from(head).ok()?, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelite_crypto_core::{Argon2Params, Argon2Variant};

    fn fast_settings() -> VaultSettings {
        VaultSettings {
            kdf: KdfParameters::Argon2(Argon2Params {
                variant: Argon2Variant::Argon2d,
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
                version: kdf::ARGON2_VERSION,
            }),
            ..VaultSettings::default()
        }
    }

    fn document(password: &str) -> Document {
        let credentials = Credentials::new(password, &KeyFileInput::None).unwrap();
        create("Test", credentials, fast_settings()).unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let doc = document("pw");
        let bytes = encode(&doc).unwrap();
        let back = decode(&bytes, doc.credentials()).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.settings, doc.settings);
    }

    #[test]
    fn every_save_uses_fresh_randomness() {
        let doc = document("pw");
        let a = inspect_header(&encode(&doc).unwrap()).unwrap();
        let b = inspect_header(&encode(&doc).unwrap()).unwrap();
        assert_ne!(a.master_seed, b.master_seed);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.kdf_salt, b.kdf_salt);
    }

    #[test]
    fn wrong_password_is_invalid_credentials() {
        let bytes = encode(&document("right")).unwrap();
        let wrong = Credentials::new("wrong", &KeyFileInput::None).unwrap();
        assert!(matches!(decode(&bytes, &wrong), Err(VaultError::InvalidCredentials)));
    }

    #[test]
    fn header_tamper_is_malformed() {
        let doc = document("pw");
        let mut bytes = encode(&doc).unwrap();
        // Flip a byte of the master seed.
        let seed_offset = 12 + 5 + 16 + 5 + 4 + 5;
        bytes[seed_offset] ^= 0xFF;
        assert!(matches!(
            decode(&bytes, doc.credentials()),
            Err(VaultError::MalformedHeader(_))
        ));
    }

    #[test]
    fn payload_tamper_is_corrupted() {
        let doc = document("pw");
        let mut bytes = encode(&doc).unwrap();
        let last = bytes.len() - 40;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decode(&bytes, doc.credentials()),
            Err(VaultError::Corrupted(_))
        ));
    }

    #[test]
    fn uncompressed_aes_cbc_roundtrip() {
        let mut doc = document("pw");
        doc.settings.cipher = PayloadCipher::Aes256Cbc;
        doc.settings.compression = false;
        let bytes = encode(&doc).unwrap();
        let header = inspect_header(&bytes).unwrap();
        assert_eq!(header.cipher, PayloadCipher::Aes256Cbc);
        assert!(!header.compressed);
        assert_eq!(decode(&bytes, doc.credentials()).unwrap(), doc);
    }

    #[test]
    fn aes_kdf_roundtrip() {
        let mut doc = document("pw");
        doc.settings.kdf = KdfParameters::Aes(AesKdfParams { rounds: 100 });
        let bytes = encode(&doc).unwrap();
        let back = decode(&bytes, doc.credentials()).unwrap();
        assert_eq!(back.settings.kdf, KdfParameters::Aes(AesKdfParams { rounds: 100 }));
    }

    #[test]
    fn truncated_file_is_error() {
        let bytes = encode(&document("pw")).unwrap();
        let creds = Credentials::new("pw", &KeyFileInput::None).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2], &creds).is_err());
    }

    #[test]
    fn default_settings_use_chacha_gzip_argon2d() {
        let s = VaultSettings::default();
        assert_eq!(s.cipher, PayloadCipher::ChaCha20);
        assert!(s.compression);
        let KdfParameters::Argon2(p) = s.kdf else {
            panic!("expected Argon2");
        };
        assert_eq!(p, KdfPreset::Balanced.default_params());
    }

    #[test]
    fn create_enables_recycle_bin_lazily() {
        let doc = document("pw");
        assert!(doc.meta.recycle_bin_enabled);
        assert!(doc.recycle_bin().is_none());
        assert_eq!(doc.root.name, "Test");
        assert_eq!(doc.meta.generator, model::GENERATOR);
    }
}
