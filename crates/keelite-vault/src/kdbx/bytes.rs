//! Bounds-checked little-endian cursor for the binary KDBX structures.

use crate::error::VaultError;

/// Cursor over a byte slice. Every read is bounds-checked; running past the
/// end yields the error built by `on_error`.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    on_error: fn(String) -> VaultError,
}

impl<'a> ByteReader<'a> {
    pub(crate) const fn new(data: &'a [u8], on_error: fn(String) -> VaultError) -> Self {
        Self {
            data,
            pos: 0,
            on_error,
        }
    }

    pub(crate) const fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining().is_empty()
    }

    pub(crate) fn error(&self, msg: impl Into<String>) -> VaultError {
        (self.on_error)(msg.into())
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], VaultError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                self.error(format!(
                    "truncated: need {len} bytes at offset {}, {} available",
                    self.pos,
                    self.data.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = self.data.get(self.pos..end).unwrap_or_default();
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], VaultError> {
        let slice = self.take(N)?;
        <[u8; N]>::try_from(slice).map_err(|_| self.error("length mismatch"))
    }

    pub(crate) fn u8(&mut self) -> Result<u8, VaultError> {
        let [byte] = self.array::<1>()?;
        Ok(byte)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, VaultError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, VaultError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, VaultError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// A `u32` length prefix followed by that many bytes.
    pub(crate) fn sized(&mut self) -> Result<&'a [u8], VaultError> {
        let len = usize::try_from(self.u32()?).map_err(|_| self.error("length overflow"))?;
        self.take(len)
    }
}

/// Append a `u32` length prefix and the bytes.
pub(crate) fn put_sized(out: &mut Vec<u8>, data: &[u8]) -> Result<(), VaultError> {
    let len = u32::try_from(data.len())
        .map_err(|_| VaultError::Corrupted(format!("field too large: {} bytes", data.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let data = [1, 0, 2, 0, 0, 0, 9];
        let mut r = ByteReader::new(&data, VaultError::MalformedHeader);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u32().unwrap(), 2);
        assert_eq!(r.u8().unwrap(), 9);
        assert!(r.is_empty());
    }

    #[test]
    fn overrun_uses_context_error() {
        let mut r = ByteReader::new(&[1, 2], VaultError::Corrupted);
        assert!(matches!(r.u32(), Err(VaultError::Corrupted(_))));
    }

    #[test]
    fn sized_roundtrip() {
        let mut out = Vec::new();
        put_sized(&mut out, b"abc").unwrap();
        let mut r = ByteReader::new(&out, VaultError::MalformedHeader);
        assert_eq!(r.sized().unwrap(), b"abc");
    }

    #[test]
    fn sized_rejects_oversized_length() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 1];
        let mut r = ByteReader::new(&data, VaultError::MalformedHeader);
        assert!(r.sized().is_err());
    }
}
