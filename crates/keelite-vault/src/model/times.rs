//! Entry and group timestamps, plus the KDBX4 time encoding.
//!
//! KDBX4 stores instants as base64 of an `i64` little-endian count of
//! seconds since `0001-01-01T00:00:00Z`. Sub-second precision is dropped on
//! every path so a saved document reloads with equal `Times`.

use chrono::{DateTime, Utc};
use data_encoding::BASE64;

use crate::error::VaultError;

/// Seconds between `0001-01-01` and the Unix epoch.
const KDBX_EPOCH_OFFSET: i64 = 62_135_596_800;

/// Current instant truncated to whole seconds.
#[must_use]
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default()
}

/// Timestamps carried by every group and entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Times {
    /// When the object was created.
    pub creation: DateTime<Utc>,
    /// Last content change. `None` when the source file omitted it.
    pub last_modification: Option<DateTime<Utc>>,
    /// Last access.
    pub last_access: DateTime<Utc>,
    /// Expiry instant, meaningful only when `expires` is set.
    pub expiry: DateTime<Utc>,
    /// Whether `expiry` applies.
    pub expires: bool,
    /// Usage counter.
    pub usage_count: u64,
    /// Last move between groups.
    pub location_changed: DateTime<Utc>,
}

impl Times {
    /// All timestamps set to now.
    #[must_use]
    pub fn now() -> Self {
        let t = now();
        Self {
            creation: t,
            last_modification: Some(t),
            last_access: t,
            expiry: t,
            expires: false,
            usage_count: 0,
            location_changed: t,
        }
    }

    /// Record a content change.
    pub fn touch(&mut self) {
        let t = now();
        self.last_modification = Some(t);
        self.last_access = t;
    }

    /// Record a move to another group.
    pub fn relocated(&mut self) {
        self.location_changed = now();
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::now()
    }
}

/// Encode an instant in the KDBX4 binary time format.
#[must_use]
pub fn encode_kdbx_time(t: &DateTime<Utc>) -> String {
    let secs = t.timestamp().saturating_add(KDBX_EPOCH_OFFSET);
    BASE64.encode(&secs.to_le_bytes())
}

/// Decode a KDBX time value.
///
/// Accepts the KDBX4 base64 form and, for files converted from KDBX3, an
/// RFC 3339 string.
///
/// # Errors
///
/// Returns [`VaultError::Xml`] if the text is neither form.
pub fn decode_kdbx_time(text: &str) -> Result<DateTime<Utc>, VaultError> {
    let text = text.trim();
    if let Ok(bytes) = BASE64.decode(text.as_bytes()) {
        if let Ok(raw) = <[u8; 8]>::try_from(bytes.as_slice()) {
            let secs = i64::from_le_bytes(raw)
                .checked_sub(KDBX_EPOCH_OFFSET)
                .ok_or_else(|| VaultError::Xml(format!("time out of range: {text}")))?;
            return DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| VaultError::Xml(format!("time out of range: {text}")));
        }
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| VaultError::Xml(format!("invalid time value: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_encodes_to_known_value() {
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        let encoded = encode_kdbx_time(&epoch);
        assert_eq!(BASE64.decode(encoded.as_bytes()).unwrap(), KDBX_EPOCH_OFFSET.to_le_bytes());
        assert_eq!(decode_kdbx_time(&encoded).unwrap(), epoch);
    }

    #[test]
    fn decode_accepts_rfc3339() {
        let t = decode_kdbx_time("2024-03-01T10:20:30Z").unwrap();
        assert_eq!(t.timestamp(), 1_709_288_430);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_kdbx_time("yesterday"), Err(VaultError::Xml(_))));
    }

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn touch_refreshes_modification() {
        let mut times = Times::now();
        times.last_modification = None;
        times.touch();
        assert!(times.last_modification.is_some());
    }
}
