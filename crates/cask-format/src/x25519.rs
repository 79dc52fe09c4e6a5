//! The native public-key recipient and identity.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bech32::{FromBase32, ToBase32, Variant};
use rand_core::OsRng;
use secrecy::{ExposeSecret, SecretString};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use cask_core::crypto::primitives::{aead_open, aead_seal, hkdf_sha256};
use cask_core::{CryptoError, FileKey};

use crate::error::{DecryptError, EncryptError};
use crate::protocol;
use crate::stanza::Stanza;

pub(crate) const STANZA_TAG: &str = "X25519";
const KEK_LABEL: &[u8] = b"age-encryption.org/v1/X25519";

// Bech32 HRPs are lower-case on the wire; the secret-key string is
// upper-cased as a whole for display.
const PUBLIC_KEY_HRP: &str = "age";
const SECRET_KEY_HRP: &str = "age-secret-key-";

const KEY_LEN: usize = 32;
const ENCRYPTED_FILE_KEY_LEN: usize = 32;

// A small-order recipient point yields the zero share on every attempt, so
// the wrap retry loop is bounded.
const WRAP_ATTEMPTS: usize = 4;

fn parse_bech32(s: &str, expected_hrp: &str) -> Result<[u8; KEY_LEN], &'static str> {
    let (hrp, data, variant) = bech32::decode(s).map_err(|_| "invalid Bech32 encoding")?;
    if variant != Variant::Bech32 {
        return Err("invalid Bech32 variant");
    }
    if hrp != expected_hrp {
        return Err("incorrect HRP");
    }
    let bytes = Vec::<u8>::from_base32(&data).map_err(|_| "incorrect Bech32 data padding")?;
    bytes.try_into().map_err(|_| "incorrect key length")
}

fn kek_for(
    shared: &x25519_dalek::SharedSecret,
    epk: &PublicKey,
    pk: &PublicKey,
) -> Result<zeroize::Zeroizing<[u8; 32]>, CryptoError> {
    let mut salt = [0u8; KEY_LEN * 2];
    salt[..KEY_LEN].copy_from_slice(epk.as_bytes());
    salt[KEY_LEN..].copy_from_slice(pk.as_bytes());
    hkdf_sha256(&salt, KEK_LABEL, shared.as_bytes())
}

/// The standard public key, `age1...`.
#[derive(Clone)]
pub struct Recipient(PublicKey);

impl FromStr for Recipient {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bech32(s, PUBLIC_KEY_HRP).map(|bytes| Recipient(PublicKey::from(bytes)))
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bech32::encode(PUBLIC_KEY_HRP, self.0.as_bytes().to_base32(), Variant::Bech32)
            .map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl protocol::Recipient for Recipient {
    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Vec<Stanza>, EncryptError> {
        for _ in 0..WRAP_ATTEMPTS {
            let ephemeral = EphemeralSecret::random_from_rng(OsRng);
            let epk = PublicKey::from(&ephemeral);
            let shared = ephemeral.diffie_hellman(&self.0);
            if !shared.was_contributory() {
                continue;
            }

            let kek = kek_for(&shared, &epk, &self.0)?;
            let body = aead_seal(&kek, file_key.expose_secret())?;
            return Ok(vec![Stanza {
                tag: STANZA_TAG.to_owned(),
                args: vec![STANDARD_NO_PAD.encode(epk.as_bytes())],
                body,
            }]);
        }
        Err(EncryptError::InvalidRecipient)
    }
}

/// The standard secret key, `AGE-SECRET-KEY-1...`.
pub struct Identity(StaticSecret);

impl Identity {
    pub fn generate() -> Self {
        Identity(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Identity(StaticSecret::from(bytes))
    }

    /// Serializes the secret key in its upper-case Bech32 form.
    #[allow(clippy::inherent_to_string)]
    pub fn to_string(&self) -> SecretString {
        let mut bytes = self.0.to_bytes();
        let mut encoded = bech32::encode(SECRET_KEY_HRP, bytes.to_base32(), Variant::Bech32)
            .expect("HRP is valid");
        let secret = SecretString::new(encoded.to_uppercase());
        bytes.zeroize();
        encoded.zeroize();
        secret
    }

    pub fn to_public(&self) -> Recipient {
        Recipient(PublicKey::from(&self.0))
    }

    fn unwrap_stanza(&self, stanza: &Stanza) -> Result<Option<FileKey>, DecryptError> {
        let [encoded_epk] = stanza.args.as_slice() else {
            return Err(DecryptError::InvalidHeader("invalid X25519 stanza"));
        };
        let epk_bytes: [u8; KEY_LEN] = STANDARD_NO_PAD
            .decode(encoded_epk)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(DecryptError::InvalidHeader("invalid X25519 stanza"))?;
        if stanza.body.len() != ENCRYPTED_FILE_KEY_LEN {
            return Err(DecryptError::InvalidHeader("invalid X25519 stanza"));
        }

        let epk = PublicKey::from(epk_bytes);
        let pk = PublicKey::from(&self.0);
        let shared = self.0.diffie_hellman(&epk);
        if !shared.was_contributory() {
            return Err(DecryptError::InvalidHeader("invalid X25519 stanza"));
        }

        let kek = kek_for(&shared, &epk, &pk).map_err(DecryptError::Crypto)?;
        match aead_open(&kek, &stanza.body) {
            Ok(plaintext) => {
                let bytes: [u8; 16] = plaintext
                    .as_slice()
                    .try_into()
                    .map_err(|_| DecryptError::InvalidHeader("invalid X25519 stanza"))?;
                Ok(Some(FileKey::from(bytes)))
            }
            // A tag failure means the stanza was wrapped to some other key;
            // the caller moves on.
            Err(CryptoError::AuthFailed) => Ok(None),
            Err(err) => Err(DecryptError::Crypto(err)),
        }
    }
}

impl FromStr for Identity {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bech32(s, SECRET_KEY_HRP).map(|bytes| Identity(StaticSecret::from(bytes)))
    }
}

impl protocol::Identity for Identity {
    fn unwrap_stanzas(&self, stanzas: &[Stanza]) -> Option<Result<FileKey, DecryptError>> {
        for stanza in stanzas {
            if stanza.tag != STANZA_TAG {
                continue;
            }
            match self.unwrap_stanza(stanza) {
                Ok(Some(file_key)) => return Some(Ok(file_key)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Identity as _, Recipient as _};

    const TEST_SK: &str =
        "AGE-SECRET-KEY-1GQ9778VQXMMJVE8SK7J6VT8UJ4HDQAJUVSFCWCM02D8GEWQ72PVQ2Y5J33";
    const TEST_PK: &str = "age1t7rxyev2z3rw82stdlrrepyc39nvn86l5078zqkf5uasdy86jp6svpy7pa";

    #[test]
    fn pubkey_encoding_roundtrips() {
        let pk: Recipient = TEST_PK.parse().expect("parse");
        assert_eq!(pk.to_string(), TEST_PK);
    }

    #[test]
    fn pubkey_from_secret_key() {
        let sk: Identity = TEST_SK.parse().expect("parse");
        assert_eq!(sk.to_public().to_string(), TEST_PK);
        assert_eq!(sk.to_string().expose_secret(), TEST_SK);
    }

    #[test]
    fn mixed_case_is_rejected() {
        let mut mixed = TEST_PK.to_owned();
        mixed.replace_range(4..5, "T");
        assert!(mixed.parse::<Recipient>().is_err());
        assert!(TEST_SK.to_lowercase().parse::<Identity>().is_ok());
    }

    #[test]
    fn wrong_hrp_is_rejected() {
        assert!(TEST_PK.parse::<Identity>().is_err());
        assert!(TEST_SK.parse::<Recipient>().is_err());
    }

    #[test]
    fn wrap_and_unwrap() {
        let identity = Identity::from_bytes([7u8; 32]);
        let file_key = FileKey::from([9u8; 16]);

        let stanzas = identity
            .to_public()
            .wrap_file_key(&file_key)
            .expect("wrap");
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].tag, "X25519");
        assert_eq!(stanzas[0].body.len(), ENCRYPTED_FILE_KEY_LEN);

        let unwrapped = identity
            .unwrap_stanzas(&stanzas)
            .expect("matches")
            .expect("unwraps");
        assert_eq!(unwrapped.expose_secret(), file_key.expose_secret());

        assert!(Identity::from_bytes([8u8; 32])
            .unwrap_stanzas(&stanzas)
            .is_none());
    }
}
