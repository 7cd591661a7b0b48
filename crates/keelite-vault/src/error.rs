//! Vault error types for `keelite-vault`.

use keelite_crypto_core::CryptoError;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Header authentication failed.
    ///
    /// Wrong password, wrong key file and a missing key file all land here so
    /// the caller cannot tell which factor was wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The bytes are not a KDBX4 container (signature, version, TLV layout).
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The header names a KDF, cipher or inner stream that is not implemented.
    #[error("unsupported: {0}")]
    UnsupportedVersion(String),

    /// Payload damaged after the header authenticated (block HMAC, gzip).
    #[error("vault data corrupted: {0}")]
    Corrupted(String),

    /// Inner XML could not be parsed or written.
    #[error("xml error: {0}")]
    Xml(String),

    /// Entry UUID does not resolve in the document.
    #[error("entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Group UUID does not resolve in the document.
    #[error("group not found: {0}")]
    GroupNotFound(Uuid),

    /// No stored record under this identifier.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// A record does not match the stored record shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// A local record with the same database name already exists.
    #[error("a record named \"{0}\" already exists")]
    DuplicateRecord(String),

    /// Record store backend failure.
    #[error("store error: {0}")]
    Store(String),

    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(CryptoError),

    /// I/O error from the filesystem or a compression stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task could not be joined.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnsupportedVersion(msg) => Self::UnsupportedVersion(msg),
            other => Self::Crypto(other),
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_crypto_is_lifted() {
        let err: VaultError = CryptoError::UnsupportedVersion("argon2 version 0x10".into()).into();
        assert!(matches!(err, VaultError::UnsupportedVersion(_)));
    }

    #[test]
    fn other_crypto_errors_stay_wrapped() {
        let err: VaultError = CryptoError::Random("empty".into()).into();
        assert!(matches!(err, VaultError::Crypto(CryptoError::Random(_))));
        assert_eq!(err.to_string(), "random source error: empty");
    }

    #[test]
    fn invalid_credentials_message_is_generic() {
        assert_eq!(VaultError::InvalidCredentials.to_string(), "invalid credentials");
    }
}
