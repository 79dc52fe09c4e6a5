//! The top-level encryption and decryption protocol.

use std::io::{self, Read, Write};

use rand_core::{OsRng, RngCore};
use secrecy::SecretString;

use cask_core::crypto::stream::{StreamReader, StreamWriter};
use cask_core::keys::PAYLOAD_NONCE_LEN;
use cask_core::FileKey;

use crate::armor::ArmoredReader;
use crate::error::{DecryptError, EncryptError};
use crate::header::Header;
use crate::scrypt;
use crate::stanza::Stanza;

/// A value that can wrap a file key into one or more header stanzas.
///
/// SSH and plugin providers implement this trait in their own crates; the
/// native implementations are [`crate::x25519::Recipient`] and
/// [`crate::scrypt::Recipient`].
pub trait Recipient {
    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Vec<Stanza>, EncryptError>;

    /// An exclusive recipient must be the only recipient of a file. Only
    /// the passphrase type returns true.
    fn exclusive(&self) -> bool {
        false
    }
}

/// A secret value that can recover the file key from the header's stanzas.
///
/// The whole stanza list is handed over so identity types whose protocol
/// spans stanzas can see all of them. `None` means no stanza belongs to
/// this identity and the caller should try the next one; `Some(Err(_))` is
/// a hard failure that aborts decryption.
pub trait Identity {
    fn unwrap_stanzas(&self, stanzas: &[Stanza]) -> Option<Result<FileKey, DecryptError>>;
}

/// Encrypts a stream to a set of recipients.
pub struct Encryptor {
    recipients: Vec<Box<dyn Recipient>>,
}

impl Encryptor {
    pub fn with_recipients(recipients: Vec<Box<dyn Recipient>>) -> Result<Self, EncryptError> {
        if recipients.is_empty() {
            return Err(EncryptError::NoRecipients);
        }
        if recipients.len() > 1 && recipients.iter().any(|recipient| recipient.exclusive()) {
            return Err(EncryptError::MixedRecipients);
        }
        Ok(Self { recipients })
    }

    pub fn with_user_passphrase(passphrase: SecretString) -> Self {
        Self {
            recipients: vec![Box::new(scrypt::Recipient::new(passphrase))],
        }
    }

    /// Writes the header and returns a writer that seals the payload.
    ///
    /// The caller must call [`StreamWriter::finish`] to emit the final
    /// chunk; without it the output is invalid.
    pub fn wrap_output<W: Write>(self, mut output: W) -> Result<StreamWriter<W>, EncryptError> {
        let file_key = FileKey::generate();

        let mut stanzas = Vec::new();
        for recipient in &self.recipients {
            stanzas.extend(recipient.wrap_file_key(&file_key)?);
        }
        if stanzas.is_empty() {
            return Err(EncryptError::NoRecipients);
        }

        let mac_key = file_key.mac_key()?;
        let header = Header::new(stanzas, &mac_key)?;
        header.write(&mut output)?;

        let mut nonce = [0u8; PAYLOAD_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        output.write_all(&nonce)?;

        let payload_key = file_key.payload_key(&nonce)?;
        Ok(StreamWriter::new(&payload_key, output))
    }
}

/// Decrypts a stream by trying identities against the header's stanzas.
pub struct Decryptor<R: Read> {
    header: Header,
    input: ArmoredReader<R>,
}

impl<R: Read> Decryptor<R> {
    /// Parses the header, transparently dearmoring armored input.
    pub fn new(input: R) -> Result<Self, DecryptError> {
        let mut input = ArmoredReader::new(input)?;
        let header = Header::read(&mut input)?;

        // Structural, so checked before any identity is consulted.
        let stanzas = header.stanzas();
        if stanzas.len() > 1 && stanzas.iter().any(|stanza| stanza.tag == scrypt::STANZA_TAG) {
            return Err(DecryptError::InvalidHeader(
                "an scrypt stanza must be the only stanza in the header",
            ));
        }

        Ok(Self { header, input })
    }

    pub fn stanzas(&self) -> &[Stanza] {
        self.header.stanzas()
    }

    /// Tries each identity in turn; the first that addresses a stanza wins.
    ///
    /// The header HMAC is verified with the recovered file key before any
    /// payload is produced.
    pub fn decrypt<'a>(
        mut self,
        identities: impl Iterator<Item = &'a dyn Identity>,
    ) -> Result<StreamReader<ArmoredReader<R>>, DecryptError> {
        let mut file_key = None;
        for identity in identities {
            if let Some(result) = identity.unwrap_stanzas(self.header.stanzas()) {
                file_key = Some(result?);
                break;
            }
        }
        let file_key = file_key.ok_or(DecryptError::NoMatchingKeys)?;

        let mac_key = file_key.mac_key()?;
        self.header.verify_mac(&mac_key)?;

        let mut nonce = [0u8; PAYLOAD_NONCE_LEN];
        read_payload_nonce(&mut self.input, &mut nonce)?;

        let payload_key = file_key.payload_key(&nonce)?;
        Ok(StreamReader::new(&payload_key, self.input))
    }
}

fn read_payload_nonce<R: Read>(reader: &mut R, nonce: &mut [u8]) -> Result<(), DecryptError> {
    match reader.read_exact(nonce) {
        Ok(()) => Ok(()),
        // A container that ends inside the nonce is truncated.
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(DecryptError::DecryptionFailed)
        }
        Err(err) => Err(err.into()),
    }
}
