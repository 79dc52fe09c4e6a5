use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroizing;

use crate::crypto::primitives::{hkdf_sha256, AEAD_KEY_LEN};
use crate::crypto::CryptoError;

pub const FILE_KEY_LEN: usize = 16;
pub const PAYLOAD_NONCE_LEN: usize = 16;

const HEADER_KEY_LABEL: &[u8] = b"header";
const PAYLOAD_KEY_LABEL: &[u8] = b"payload";

/// The symmetric key a file is encrypted under.
///
/// One is generated per encryption, wrapped once per recipient, and used
/// only to derive the header MAC key and the payload key.
pub struct FileKey(Secret<[u8; FILE_KEY_LEN]>);

impl FileKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; FILE_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        FileKey(Secret::new(bytes))
    }

    /// The key for the header HMAC.
    pub fn mac_key(&self) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
        hkdf_sha256(&[], HEADER_KEY_LABEL, self.0.expose_secret())
    }

    /// The payload key, bound to the nonce prepended to the payload.
    pub fn payload_key(
        &self,
        nonce: &[u8; PAYLOAD_NONCE_LEN],
    ) -> Result<Zeroizing<[u8; AEAD_KEY_LEN]>, CryptoError> {
        hkdf_sha256(nonce, PAYLOAD_KEY_LABEL, self.0.expose_secret())
    }
}

impl From<[u8; FILE_KEY_LEN]> for FileKey {
    fn from(bytes: [u8; FILE_KEY_LEN]) -> Self {
        FileKey(Secret::new(bytes))
    }
}

impl ExposeSecret<[u8; FILE_KEY_LEN]> for FileKey {
    fn expose_secret(&self) -> &[u8; FILE_KEY_LEN] {
        self.0.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_are_domain_separated() {
        let file_key = FileKey::from([7u8; FILE_KEY_LEN]);
        let mac_key = file_key.mac_key().expect("mac key");
        let payload_key = file_key.payload_key(&[0u8; PAYLOAD_NONCE_LEN]).expect("payload key");
        assert_ne!(*mac_key, *payload_key);
    }

    #[test]
    fn payload_key_depends_on_nonce() {
        let file_key = FileKey::from([7u8; FILE_KEY_LEN]);
        let a = file_key.payload_key(&[0u8; PAYLOAD_NONCE_LEN]).expect("payload key");
        let b = file_key.payload_key(&[1u8; PAYLOAD_NONCE_LEN]).expect("payload key");
        assert_ne!(*a, *b);
    }
}
