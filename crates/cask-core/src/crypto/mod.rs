use thiserror::Error;

pub mod kdf;
pub mod primitives;
pub mod stream;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HKDF expansion failed")]
    Hkdf,
    #[error("invalid MAC key length: {0}")]
    InvalidMacKeyLength(usize),
    #[error("authentication failed")]
    AuthFailed,
    #[error("truncated ciphertext")]
    Truncated,
    #[error("ciphertext chunk too short: {0} bytes")]
    ChunkTooShort(usize),
    #[error("chunk counter overflow")]
    CounterOverflow,
    #[error("invalid scrypt work factor: {0}")]
    InvalidWorkFactor(u8),
    #[error("scrypt derivation failed")]
    Scrypt,
}
