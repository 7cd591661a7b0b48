//! KDBX4 outer header.
//!
//! Layout: two signature words, a `u16` minor + `u16` major version, then
//! TLV fields (`u8` id, `u32` length, data) up to the end field. The raw
//! header bytes are covered by a SHA-256 checksum and an HMAC that follow
//! them in the file.

use keelite_crypto_core::kdf::{Argon2Params, Argon2Variant};
use keelite_crypto_core::PayloadCipher;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::kdbx::bytes::{put_sized, ByteReader};

/// First signature word (KeePass 2.x family).
pub const SIGNATURE_1: u32 = 0x9AA2_D903;
/// Second signature word (KDBX 2.x+ container).
pub const SIGNATURE_2: u32 = 0xB54B_FB67;
/// Major format version this engine reads and writes.
pub const MAJOR_VERSION: u16 = 4;
/// Minor format version written on save.
pub const MINOR_VERSION: u16 = 0;

const FIELD_END: u8 = 0;
const FIELD_CIPHER_ID: u8 = 2;
const FIELD_COMPRESSION: u8 = 3;
const FIELD_MASTER_SEED: u8 = 4;
const FIELD_IV: u8 = 7;
const FIELD_KDF_PARAMETERS: u8 = 11;
const FIELD_PUBLIC_CUSTOM_DATA: u8 = 12;

const END_OF_HEADER: &[u8] = b"\r\n\r\n";

/// Argon2d KDF UUID `ef636ddf-8c29-444b-91f7-a9a403e30a0c`.
const KDF_ARGON2D: [u8; 16] = [
    0xef, 0x63, 0x6d, 0xdf, 0x8c, 0x29, 0x44, 0x4b, 0x91, 0xf7, 0xa9, 0xa4, 0x03, 0xe3, 0x0a, 0x0c,
];
/// Argon2id KDF UUID `9e298b19-56db-4773-b23d-fc3ec6f0a1e6`.
const KDF_ARGON2ID: [u8; 16] = [
    0x9e, 0x29, 0x8b, 0x19, 0x56, 0xdb, 0x47, 0x73, 0xb2, 0x3d, 0xfc, 0x3e, 0xc6, 0xf0, 0xa1, 0xe6,
];
/// AES-KDF UUID `c9d9f39a-628a-4460-bf74-0d08c18a4fea`.
const KDF_AES: [u8; 16] = [
    0xc9, 0xd9, 0xf3, 0x9a, 0x62, 0x8a, 0x44, 0x60, 0xbf, 0x74, 0x0d, 0x08, 0xc1, 0x8a, 0x4f, 0xea,
];

// ---------------------------------------------------------------------------
// VariantDictionary
// ---------------------------------------------------------------------------

const VD_VERSION: u16 = 0x0100;
const VD_CRITICAL_MASK: u16 = 0xFF00;

/// One typed value of a KDBX variant dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    U32(u32),
    U64(u64),
    Bool(bool),
    I32(i32),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Variant {
    const fn type_id(&self) -> u8 {
        match self {
            Self::U32(_) => 0x04,
            Self::U64(_) => 0x05,
            Self::Bool(_) => 0x08,
            Self::I32(_) => 0x0C,
            Self::I64(_) => 0x0D,
            Self::Str(_) => 0x18,
            Self::Bytes(_) => 0x42,
        }
    }
}

/// Ordered key/value map used for KDF parameters and public custom data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariantDictionary {
    items: Vec<(String, Variant)>,
}

impl VariantDictionary {
    /// Value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: &str, value: Variant) {
        if let Some(slot) = self.items.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.items.push((key.to_owned(), value));
        }
    }

    fn bytes(&self, key: &str) -> Result<&[u8], VaultError> {
        match self.get(key) {
            Some(Variant::Bytes(b)) => Ok(b),
            _ => Err(missing(key)),
        }
    }

    fn u32(&self, key: &str) -> Result<u32, VaultError> {
        match self.get(key) {
            Some(Variant::U32(v)) => Ok(*v),
            _ => Err(missing(key)),
        }
    }

    fn u64(&self, key: &str) -> Result<u64, VaultError> {
        match self.get(key) {
            Some(Variant::U64(v)) => Ok(*v),
            _ => Err(missing(key)),
        }
    }

    /// Parse a serialized dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedHeader`] on a bad version, unknown
    /// value type, or truncation.
    pub fn parse(data: &[u8]) -> Result<Self, VaultError> {
        let mut r = ByteReader::new(data, VaultError::MalformedHeader);
        let version = r.u16()?;
        if (version & VD_CRITICAL_MASK) > (VD_VERSION & VD_CRITICAL_MASK) {
            return Err(VaultError::UnsupportedVersion(format!(
                "variant dictionary version {version:#06x}"
            )));
        }
        let mut dict = Self::default();
        loop {
            let kind = r.u8()?;
            if kind == 0 {
                break;
            }
            let key = String::from_utf8(r.sized()?.to_vec())
                .map_err(|_| VaultError::MalformedHeader("variant key is not UTF-8".into()))?;
            let raw = r.sized()?;
            let value = match kind {
                0x04 => Variant::U32(u32::from_le_bytes(fixed(raw, &key)?)),
                0x05 => Variant::U64(u64::from_le_bytes(fixed(raw, &key)?)),
                0x08 => Variant::Bool(raw.first().copied().unwrap_or(0) != 0),
                0x0C => Variant::I32(i32::from_le_bytes(fixed(raw, &key)?)),
                0x0D => Variant::I64(i64::from_le_bytes(fixed(raw, &key)?)),
                0x18 => Variant::Str(String::from_utf8_lossy(raw).into_owned()),
                0x42 => Variant::Bytes(raw.to_vec()),
                other => {
                    return Err(VaultError::MalformedHeader(format!(
                        "variant {key} has unknown type {other:#04x}"
                    )))
                }
            };
            dict.items.push((key, value));
        }
        Ok(dict)
    }

    /// Serialize the dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Corrupted`] if a value exceeds `u32` length.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        let mut out = VD_VERSION.to_le_bytes().to_vec();
        for (key, value) in &self.items {
            out.push(value.type_id());
            put_sized(&mut out, key.as_bytes())?;
            match value {
                Variant::U32(v) => put_sized(&mut out, &v.to_le_bytes())?,
                Variant::U64(v) => put_sized(&mut out, &v.to_le_bytes())?,
                Variant::Bool(v) => put_sized(&mut out, &[u8::from(*v)])?,
                Variant::I32(v) => put_sized(&mut out, &v.to_le_bytes())?,
                Variant::I64(v) => put_sized(&mut out, &v.to_le_bytes())?,
                Variant::Str(v) => put_sized(&mut out, v.as_bytes())?,
                Variant::Bytes(v) => put_sized(&mut out, v)?,
            }
        }
        out.push(0);
        Ok(out)
    }
}

fn fixed<const N: usize>(raw: &[u8], key: &str) -> Result<[u8; N], VaultError> {
    <[u8; N]>::try_from(raw)
        .map_err(|_| VaultError::MalformedHeader(format!("variant {key} has wrong length")))
}

fn missing(key: &str) -> VaultError {
    VaultError::MalformedHeader(format!("KDF parameter {key} missing or mistyped"))
}

// ---------------------------------------------------------------------------
// KDF parameters
// ---------------------------------------------------------------------------

/// AES-KDF cost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AesKdfParams {
    /// Number of AES-256-ECB rounds.
    pub rounds: u64,
}

/// Key-derivation function declared in header field 11, salt excluded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KdfParameters {
    Argon2(Argon2Params),
    Aes(AesKdfParams),
}

impl KdfParameters {
    /// Decode from a variant dictionary, returning the parameters and the
    /// salt (Argon2 `S`) or seed (AES-KDF `S`).
    ///
    /// # Errors
    ///
    /// - [`VaultError::UnsupportedVersion`] for an unknown KDF UUID.
    /// - [`VaultError::MalformedHeader`] for missing or out-of-range values.
    pub fn from_dictionary(dict: &VariantDictionary) -> Result<(Self, Vec<u8>), VaultError> {
        let uuid = dict.bytes("$UUID")?;
        let salt = dict.bytes("S")?.to_vec();
        if uuid == KDF_AES {
            return Ok((Self::Aes(AesKdfParams { rounds: dict.u64("R")? }), salt));
        }
        let variant = if uuid == KDF_ARGON2D {
            Argon2Variant::Argon2d
        } else if uuid == KDF_ARGON2ID {
            Argon2Variant::Argon2id
        } else {
            return Err(VaultError::UnsupportedVersion(format!(
                "KDF {}",
                data_encoding::HEXLOWER.encode(uuid)
            )));
        };
        let memory_kib = u32::try_from(dict.u64("M")? / 1024)
            .map_err(|_| VaultError::MalformedHeader("Argon2 memory out of range".into()))?;
        let iterations = u32::try_from(dict.u64("I")?)
            .map_err(|_| VaultError::MalformedHeader("Argon2 iterations out of range".into()))?;
        let params = Argon2Params {
            variant,
            memory_kib,
            iterations,
            parallelism: dict.u32("P")?,
            version: dict.u32("V")?,
        };
        Ok((Self::Argon2(params), salt))
    }

    /// Encode with a fresh salt/seed.
    #[must_use]
    pub fn to_dictionary(&self, salt: &[u8]) -> VariantDictionary {
        let mut dict = VariantDictionary::default();
        match self {
            Self::Argon2(params) => {
                let uuid = match params.variant {
                    Argon2Variant::Argon2d => KDF_ARGON2D,
                    Argon2Variant::Argon2id => KDF_ARGON2ID,
                };
                dict.set("$UUID", Variant::Bytes(uuid.to_vec()));
                dict.set("S", Variant::Bytes(salt.to_vec()));
                dict.set("P", Variant::U32(params.parallelism));
                dict.set(
                    "M",
                    Variant::U64(u64::from(params.memory_kib).saturating_mul(1024)),
                );
                dict.set("I", Variant::U64(u64::from(params.iterations)));
                dict.set("V", Variant::U32(params.version));
            }
            Self::Aes(params) => {
                dict.set("$UUID", Variant::Bytes(KDF_AES.to_vec()));
                dict.set("S", Variant::Bytes(salt.to_vec()));
                dict.set("R", Variant::U64(params.rounds));
            }
        }
        dict
    }
}

// ---------------------------------------------------------------------------
// OuterHeader
// ---------------------------------------------------------------------------

/// Parsed outer header.
#[derive(Clone, Debug)]
pub struct OuterHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub cipher: PayloadCipher,
    /// Gzip flag (field 3).
    pub compressed: bool,
    pub master_seed: [u8; 32],
    pub iv: Vec<u8>,
    pub kdf: KdfParameters,
    /// Argon2 salt or AES-KDF seed.
    pub kdf_salt: Vec<u8>,
    /// Field 12, kept opaque.
    pub public_custom_data: Option<Vec<u8>>,
    raw: Vec<u8>,
}

impl OuterHeader {
    /// Parse the header from the start of a KDBX file.
    ///
    /// # Errors
    ///
    /// - [`VaultError::MalformedHeader`] for a foreign signature, another
    ///   major version, a missing field or truncation.
    /// - [`VaultError::UnsupportedVersion`] for an unknown cipher or KDF.
    pub fn parse(data: &[u8]) -> Result<Self, VaultError> {
        let mut r = ByteReader::new(data, VaultError::MalformedHeader);
        if r.u32()? != SIGNATURE_1 || r.u32()? != SIGNATURE_2 {
            return Err(VaultError::MalformedHeader("not a KDBX file".into()));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        if major_version != MAJOR_VERSION {
            return Err(VaultError::MalformedHeader(format!(
                "KDBX {major_version}.{minor_version} is not supported"
            )));
        }

        let mut cipher = None;
        let mut compressed = None;
        let mut master_seed = None;
        let mut iv = None;
        let mut kdf = None;
        let mut public_custom_data = None;

        loop {
            let id = r.u8()?;
            let value = r.sized()?;
            match id {
                FIELD_END => break,
                FIELD_CIPHER_ID => cipher = Some(PayloadCipher::from_uuid(value)?),
                FIELD_COMPRESSION => {
                    let flag = <[u8; 4]>::try_from(value).map_err(|_| {
                        VaultError::MalformedHeader("compression flag length".into())
                    })?;
                    compressed = Some(match u32::from_le_bytes(flag) {
                        0 => false,
                        1 => true,
                        other => {
                            return Err(VaultError::UnsupportedVersion(format!(
                                "compression algorithm {other}"
                            )))
                        }
                    });
                }
                FIELD_MASTER_SEED => {
                    master_seed = Some(<[u8; 32]>::try_from(value).map_err(|_| {
                        VaultError::MalformedHeader("master seed must be 32 bytes".into())
                    })?);
                }
                FIELD_IV => iv = Some(value.to_vec()),
                FIELD_KDF_PARAMETERS => {
                    kdf = Some(KdfParameters::from_dictionary(&VariantDictionary::parse(
                        value,
                    )?)?);
                }
                FIELD_PUBLIC_CUSTOM_DATA => public_custom_data = Some(value.to_vec()),
                other => {
                    tracing::debug!(field = other, len = value.len(), "skipping header field");
                }
            }
        }

        let raw = data.get(..r.position()).unwrap_or_default().to_vec();
        let cipher = cipher.ok_or_else(|| field_missing("cipher"))?;
        let iv = iv.ok_or_else(|| field_missing("encryption IV"))?;
        if iv.len() != cipher.iv_len() {
            return Err(VaultError::MalformedHeader(format!(
                "IV is {} bytes, cipher needs {}",
                iv.len(),
                cipher.iv_len()
            )));
        }
        let (kdf, kdf_salt) = kdf.ok_or_else(|| field_missing("KDF parameters"))?;

        Ok(Self {
            major_version,
            minor_version,
            cipher,
            compressed: compressed.ok_or_else(|| field_missing("compression flag"))?,
            master_seed: master_seed.ok_or_else(|| field_missing("master seed"))?,
            iv,
            kdf,
            kdf_salt,
            public_custom_data,
            raw,
        })
    }

    /// Serialize the header; the result is also what [`raw`](Self::raw)
    /// returns after a re-parse.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Corrupted`] if a field exceeds `u32` length.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        out.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.major_version.to_le_bytes());

        put_field(&mut out, FIELD_CIPHER_ID, &self.cipher.uuid())?;
        put_field(
            &mut out,
            FIELD_COMPRESSION,
            &u32::from(self.compressed).to_le_bytes(),
        )?;
        put_field(&mut out, FIELD_MASTER_SEED, &self.master_seed)?;
        put_field(&mut out, FIELD_IV, &self.iv)?;
        let kdf = self.kdf.to_dictionary(&self.kdf_salt).to_bytes()?;
        put_field(&mut out, FIELD_KDF_PARAMETERS, &kdf)?;
        if let Some(custom) = &self.public_custom_data {
            put_field(&mut out, FIELD_PUBLIC_CUSTOM_DATA, custom)?;
        }
        put_field(&mut out, FIELD_END, END_OF_HEADER)?;
        Ok(out)
    }

    /// Header bytes exactly as read, for checksum and HMAC verification.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Build a header for writing.
    #[must_use]
    pub const fn for_write(
        cipher: PayloadCipher,
        compressed: bool,
        master_seed: [u8; 32],
        iv: Vec<u8>,
        kdf: KdfParameters,
        kdf_salt: Vec<u8>,
        public_custom_data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            cipher,
            compressed,
            master_seed,
            iv,
            kdf,
            kdf_salt,
            public_custom_data,
            raw: Vec::new(),
        }
    }
}

fn put_field(out: &mut Vec<u8>, id: u8, value: &[u8]) -> Result<(), VaultError> {
    out.push(id);
    put_sized(out, value)
}

fn field_missing(name: &str) -> VaultError {
    VaultError::MalformedHeader(format!("header field missing: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelite_crypto_core::kdf::ARGON2_VERSION;

    fn argon2() -> KdfParameters {
        KdfParameters::Argon2(Argon2Params {
            variant: Argon2Variant::Argon2id,
            memory_kib: 1024,
            iterations: 3,
            parallelism: 2,
            version: ARGON2_VERSION,
        })
    }

    fn header() -> OuterHeader {
        OuterHeader::for_write(
            PayloadCipher::ChaCha20,
            true,
            [7u8; 32],
            vec![1u8; 12],
            argon2(),
            vec![9u8; 32],
            None,
        )
    }

    #[test]
    fn header_roundtrip_keeps_fields() {
        let bytes = header().to_bytes().unwrap();
        let parsed = OuterHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.cipher, PayloadCipher::ChaCha20);
        assert!(parsed.compressed);
        assert_eq!(parsed.master_seed, [7u8; 32]);
        assert_eq!(parsed.kdf, argon2());
        assert_eq!(parsed.kdf_salt, vec![9u8; 32]);
        assert_eq!(parsed.raw(), bytes.as_slice());
    }

    #[test]
    fn parse_stops_at_end_field() {
        let mut bytes = header().to_bytes().unwrap();
        let len = bytes.len();
        bytes.extend_from_slice(b"payload follows");
        assert_eq!(OuterHeader::parse(&bytes).unwrap().raw().len(), len);
    }

    #[test]
    fn foreign_signature_is_malformed() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(VaultError::MalformedHeader(_))
        ));
    }

    #[test]
    fn kdbx3_is_malformed() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[10] = 3;
        assert!(matches!(
            OuterHeader::parse(&bytes),
            Err(VaultError::MalformedHeader(_))
        ));
    }

    #[test]
    fn unknown_kdf_is_unsupported() {
        let mut dict = argon2().to_dictionary(&[0u8; 32]);
        dict.set("$UUID", Variant::Bytes(vec![0xAB; 16]));
        let err = KdfParameters::from_dictionary(&dict).unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedVersion(_)));
    }

    #[test]
    fn aes_kdf_dictionary_roundtrip() {
        let kdf = KdfParameters::Aes(AesKdfParams { rounds: 60_000 });
        let bytes = kdf.to_dictionary(&[3u8; 32]).to_bytes().unwrap();
        let (parsed, seed) =
            KdfParameters::from_dictionary(&VariantDictionary::parse(&bytes).unwrap()).unwrap();
        assert_eq!(parsed, kdf);
        assert_eq!(seed, vec![3u8; 32]);
    }

    #[test]
    fn variant_dictionary_keeps_all_types() {
        let mut dict = VariantDictionary::default();
        dict.set("a", Variant::U32(1));
        dict.set("b", Variant::U64(2));
        dict.set("c", Variant::Bool(true));
        dict.set("d", Variant::I32(-3));
        dict.set("e", Variant::I64(-4));
        dict.set("f", Variant::Str("x".into()));
        dict.set("g", Variant::Bytes(vec![5]));
        let parsed = VariantDictionary::parse(&dict.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, dict);
    }

    #[test]
    fn newer_dictionary_major_is_unsupported() {
        let mut bytes = VariantDictionary::default().to_bytes().unwrap();
        bytes[1] = 0x02;
        assert!(matches!(
            VariantDictionary::parse(&bytes),
            Err(VaultError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let bytes = header().to_bytes().unwrap();
        assert!(matches!(
            OuterHeader::parse(&bytes[..20]),
            Err(VaultError::MalformedHeader(_))
        ));
    }
}
