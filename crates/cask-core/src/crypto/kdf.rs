use scrypt::Params;
use zeroize::Zeroizing;

use crate::crypto::primitives::AEAD_KEY_LEN;
use crate::crypto::CryptoError;

pub const SALT_LEN: usize = 16;

pub const MIN_WORK_FACTOR: u8 = 1;
pub const MAX_WORK_FACTOR: u8 = 30;
pub const DEFAULT_WORK_FACTOR: u8 = 18;
/// Decryption refuses anything above this; a larger factor in an untrusted
/// header is a denial-of-service vector, not a stronger file.
pub const MAX_DECRYPT_WORK_FACTOR: u8 = 22;

const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Derives a 32-byte key-encryption key from a passphrase.
///
/// `log_n` is the base-2 logarithm of the scrypt N parameter and must lie in
/// `MIN_WORK_FACTOR..=MAX_WORK_FACTOR`.
pub fn derive_kek(
    passphrase: &[u8],
    salt: &[u8],
    log_n: u8,
) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
    if !(MIN_WORK_FACTOR..=MAX_WORK_FACTOR).contains(&log_n) {
        return Err(CryptoError::InvalidWorkFactor(log_n));
    }

    let params = Params::new(log_n, SCRYPT_R, SCRYPT_P, AEAD_KEY_LEN)
        .map_err(|_| CryptoError::InvalidWorkFactor(log_n))?;

    let mut kek = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    scrypt::scrypt(passphrase, salt, &params, kek.as_mut_slice())
        .map_err(|_| CryptoError::Scrypt)?;
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_work_factors() {
        assert!(matches!(
            derive_kek(b"pw", b"salt", 0),
            Err(CryptoError::InvalidWorkFactor(0))
        ));
        assert!(matches!(
            derive_kek(b"pw", b"salt", 31),
            Err(CryptoError::InvalidWorkFactor(31))
        ));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_kek(b"passphrase", b"fixed salt", 4).expect("derive");
        let b = derive_kek(b"passphrase", b"fixed salt", 4).expect("derive");
        assert_eq!(*a, *b);
        let c = derive_kek(b"passphrase", b"other salt", 4).expect("derive");
        assert_ne!(*a, *c);
    }
}
