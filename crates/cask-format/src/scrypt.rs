//! The passphrase recipient and identity.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};

use cask_core::crypto::kdf::{
    derive_kek, DEFAULT_WORK_FACTOR, MAX_DECRYPT_WORK_FACTOR, MAX_WORK_FACTOR, MIN_WORK_FACTOR,
    SALT_LEN,
};
use cask_core::crypto::primitives::{aead_open, aead_seal};
use cask_core::{CryptoError, FileKey};

use crate::error::{DecryptError, EncryptError};
use crate::protocol;
use crate::stanza::Stanza;

pub(crate) const STANZA_TAG: &str = "scrypt";
const KEK_LABEL: &[u8] = b"age-encryption.org/v1/scrypt";
const ENCRYPTED_FILE_KEY_LEN: usize = 32;

fn labelled_salt(salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut labelled = Vec::with_capacity(KEK_LABEL.len() + SALT_LEN);
    labelled.extend_from_slice(KEK_LABEL);
    labelled.extend_from_slice(salt);
    labelled
}

/// A passphrase recipient. Must be the only recipient of a file.
pub struct Recipient {
    passphrase: SecretString,
    work_factor: u8,
}

impl Recipient {
    pub fn new(passphrase: SecretString) -> Self {
        Self {
            passphrase,
            work_factor: DEFAULT_WORK_FACTOR,
        }
    }

    /// Overrides the scrypt work factor (log₂ N), mainly to speed up tests
    /// and tooling. Values outside 1..=30 are rejected at wrap time.
    pub fn set_work_factor(&mut self, work_factor: u8) {
        self.work_factor = work_factor;
    }

    fn wrap_with_salt(
        &self,
        file_key: &FileKey,
        salt: &[u8; SALT_LEN],
    ) -> Result<Stanza, EncryptError> {
        if !(MIN_WORK_FACTOR..=MAX_WORK_FACTOR).contains(&self.work_factor) {
            return Err(EncryptError::InvalidWorkFactor(self.work_factor));
        }

        let kek = derive_kek(
            self.passphrase.expose_secret().as_bytes(),
            &labelled_salt(salt),
            self.work_factor,
        )?;
        let body = aead_seal(&kek, file_key.expose_secret())?;

        Ok(Stanza {
            tag: STANZA_TAG.to_owned(),
            args: vec![
                STANDARD_NO_PAD.encode(salt),
                self.work_factor.to_string(),
            ],
            body,
        })
    }
}

impl protocol::Recipient for Recipient {
    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Vec<Stanza>, EncryptError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Ok(vec![self.wrap_with_salt(file_key, &salt)?])
    }

    fn exclusive(&self) -> bool {
        true
    }
}

/// A passphrase identity.
pub struct Identity {
    passphrase: SecretString,
}

impl Identity {
    pub fn new(passphrase: SecretString) -> Self {
        Self { passphrase }
    }

    fn unwrap_stanza(&self, stanza: &Stanza) -> Result<Option<FileKey>, DecryptError> {
        let [encoded_salt, work_factor_arg] = stanza.args.as_slice() else {
            return Err(DecryptError::InvalidHeader("invalid scrypt stanza"));
        };

        let salt: [u8; SALT_LEN] = STANDARD_NO_PAD
            .decode(encoded_salt)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(DecryptError::InvalidHeader("invalid scrypt stanza"))?;

        let work_factor = parse_work_factor(work_factor_arg)
            .ok_or(DecryptError::InvalidHeader("invalid scrypt stanza"))?;
        // Refused before scrypt ever runs.
        if work_factor > MAX_DECRYPT_WORK_FACTOR {
            return Err(DecryptError::ScryptParamsTooLarge(work_factor));
        }
        if stanza.body.len() != ENCRYPTED_FILE_KEY_LEN {
            return Err(DecryptError::InvalidHeader("invalid scrypt stanza"));
        }

        let kek = derive_kek(
            self.passphrase.expose_secret().as_bytes(),
            &labelled_salt(&salt),
            work_factor,
        )
        .map_err(DecryptError::Crypto)?;

        match aead_open(&kek, &stanza.body) {
            Ok(plaintext) => {
                let bytes: [u8; 16] = plaintext
                    .as_slice()
                    .try_into()
                    .map_err(|_| DecryptError::InvalidHeader("invalid scrypt stanza"))?;
                Ok(Some(FileKey::from(bytes)))
            }
            // Wrong passphrase: let the caller try another identity.
            Err(CryptoError::AuthFailed) => Ok(None),
            Err(err) => Err(DecryptError::Crypto(err)),
        }
    }
}

impl protocol::Identity for Identity {
    fn unwrap_stanzas(&self, stanzas: &[Stanza]) -> Option<Result<FileKey, DecryptError>> {
        for stanza in stanzas {
            if stanza.tag != STANZA_TAG {
                continue;
            }
            // The top level enforces this too, but an identity may be handed
            // a raw stanza list.
            if stanzas.len() > 1 {
                return Some(Err(DecryptError::InvalidHeader(
                    "an scrypt stanza must be the only stanza in the header",
                )));
            }
            return match self.unwrap_stanza(stanza) {
                Ok(Some(file_key)) => Some(Ok(file_key)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            };
        }
        None
    }
}

/// The work factor argument is strict decimal: digits only, no leading
/// zeros, no sign.
fn parse_work_factor(arg: &str) -> Option<u8> {
    if arg.is_empty() || !arg.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    if arg.len() > 1 && arg.starts_with('0') {
        return None;
    }
    arg.parse().ok()
}
