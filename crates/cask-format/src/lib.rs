#![deny(warnings)]
#![deny(clippy::all)]

pub mod armor;
mod error;
mod fileio;
mod header;
mod protocol;
pub mod scrypt;
mod stanza;
pub mod x25519;

pub use cask_core::crypto::stream::{StreamReader, StreamWriter};
pub use cask_core::FileKey;
pub use error::{DecryptError, EncryptError};
pub use fileio::{read_identities, read_recipients, ParseError};
pub use header::{Header, MAX_HEADER_LEN};
pub use protocol::{Decryptor, Encryptor, Identity, Recipient};
pub use stanza::Stanza;
