use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::CryptoError;

pub const AEAD_KEY_LEN: usize = 32;
pub const AEAD_TAG_LEN: usize = 16;
pub const MAC_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// HKDF-SHA-256 extract-and-expand to a 32-byte output key.
pub fn hkdf_sha256(
    salt: &[u8],
    info: &[u8],
    ikm: &[u8],
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    hkdf.expand(info, okm.as_mut_slice())
        .map_err(|_| CryptoError::Hkdf)?;
    Ok(okm)
}

pub fn hmac_sha256(key: &[u8; MAC_LEN], data: &[u8]) -> Result<[u8; MAC_LEN], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidMacKeyLength(key.len()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time HMAC-SHA-256 verification.
pub fn verify_hmac_sha256(
    key: &[u8; MAC_LEN],
    data: &[u8],
    tag: &[u8],
) -> Result<bool, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidMacKeyLength(key.len()))?;
    mac.update(data);
    Ok(mac.verify_slice(tag).is_ok())
}

/// Seals a small value under a single-use key.
///
/// The all-zero nonce is sound only because every wrapping key is derived
/// fresh per stanza and never reused.
pub fn aead_seal(key: &[u8; AEAD_KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aead = ChaCha20Poly1305::new(Key::from_slice(key));
    aead.encrypt(&Nonce::default(), plaintext)
        .map_err(|_| CryptoError::AuthFailed)
}

pub fn aead_open(
    key: &[u8; AEAD_KEY_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let aead = ChaCha20Poly1305::new(Key::from_slice(key));
    aead.decrypt(&Nonce::default(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthFailed)
}
