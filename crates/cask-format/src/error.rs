use std::io;

use thiserror::Error;

use cask_core::CryptoError;

use crate::armor::ArmorError;

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("at least one recipient is required")]
    NoRecipients,
    #[error("a passphrase recipient cannot be combined with other recipients")]
    MixedRecipients,
    #[error("invalid scrypt work factor: {0}")]
    InvalidWorkFactor(u8),
    #[error("invalid recipient public key")]
    InvalidRecipient,
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("invalid armor: {0}")]
    Dearmor(io::Error),
    #[error("crypto error: {0}")]
    Crypto(CryptoError),
    #[error("not an age file")]
    NotAnAgeFile,
    #[error("malformed header: {0}")]
    InvalidHeader(&'static str),
    #[error("header exceeds {} bytes", crate::header::MAX_HEADER_LEN)]
    HeaderTooLarge,
    #[error("header HMAC mismatch")]
    HmacMismatch,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("no identity matched any of the file's recipients")]
    NoMatchingKeys,
    #[error("scrypt work factor {0} exceeds the decryption limit")]
    ScryptParamsTooLarge(u8),
    /// A hard failure reported by an identity implementation.
    #[error("{0}")]
    Identity(String),
}

impl From<io::Error> for DecryptError {
    fn from(err: io::Error) -> Self {
        // Armor violations and payload authentication failures travel
        // through `Read` as wrapped io errors; unwrap them to their kinds.
        match err.get_ref() {
            Some(inner) if inner.is::<ArmorError>() => DecryptError::Dearmor(err),
            Some(inner) if inner.is::<CryptoError>() => DecryptError::DecryptionFailed,
            _ => DecryptError::Io(err),
        }
    }
}

impl From<CryptoError> for DecryptError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthFailed | CryptoError::Truncated | CryptoError::ChunkTooShort(_) => {
                DecryptError::DecryptionFailed
            }
            other => DecryptError::Crypto(other),
        }
    }
}
