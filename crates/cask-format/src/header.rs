use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use cask_core::crypto::primitives::{hmac_sha256, verify_hmac_sha256, MAC_LEN};
use cask_core::CryptoError;

use crate::error::DecryptError;
use crate::stanza::Stanza;

pub(crate) const V1_INTRO: &str = "age-encryption.org/v1";
const MAC_PREFIX: &str = "--- ";

/// Hard cap on header bytes, so a hostile input cannot balloon memory.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// The textual header: intro line, stanzas, and the HMAC trailer.
#[derive(Debug)]
pub struct Header {
    stanzas: Vec<Stanza>,
    mac: [u8; MAC_LEN],
    // All header bytes up to and including "--- ", i.e. the HMAC input.
    mac_input: Vec<u8>,
}

impl Header {
    /// Builds a header over a non-empty stanza list, computing the HMAC.
    pub(crate) fn new(stanzas: Vec<Stanza>, mac_key: &[u8; MAC_LEN]) -> Result<Self, CryptoError> {
        let mut mac_input = Vec::new();
        mac_input.extend_from_slice(V1_INTRO.as_bytes());
        mac_input.push(b'\n');
        for stanza in &stanzas {
            stanza.write(&mut mac_input)?;
        }
        mac_input.extend_from_slice(MAC_PREFIX.as_bytes());

        let mac = hmac_sha256(mac_key, &mac_input)?;
        Ok(Self {
            stanzas,
            mac,
            mac_input,
        })
    }

    pub fn stanzas(&self) -> &[Stanza] {
        &self.stanzas
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.mac_input.clone();
        out.extend_from_slice(STANDARD_NO_PAD.encode(self.mac).as_bytes());
        out.push(b'\n');
        out
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    pub(crate) fn verify_mac(&self, mac_key: &[u8; MAC_LEN]) -> Result<(), DecryptError> {
        match verify_hmac_sha256(mac_key, &self.mac_input, &self.mac) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DecryptError::HmacMismatch),
            Err(err) => Err(DecryptError::Crypto(err)),
        }
    }

    /// Parses a header, consuming exactly the header bytes from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, DecryptError> {
        let mut lines = LineReader::new(reader);

        let intro = lines.next_line()?;
        if intro != V1_INTRO {
            return Err(DecryptError::NotAnAgeFile);
        }

        let mut stanzas = Vec::new();
        loop {
            let line = lines.next_line()?;
            if let Some(encoded_mac) = line.strip_prefix(MAC_PREFIX) {
                if stanzas.is_empty() {
                    return Err(DecryptError::InvalidHeader("header contains no stanzas"));
                }
                let mac = parse_mac(encoded_mac)?;
                // The HMAC input stops after "--- "; the transcript still
                // holds the encoded MAC and its newline.
                let transcript = lines.transcript();
                let cut = transcript.len() - line.len() - 1 + MAC_PREFIX.len();
                let mac_input = transcript[..cut].to_vec();
                return Ok(Self {
                    stanzas,
                    mac,
                    mac_input,
                });
            }
            stanzas.push(read_stanza(&line, &mut lines)?);
        }
    }
}

fn parse_mac(encoded: &str) -> Result<[u8; MAC_LEN], DecryptError> {
    STANDARD_NO_PAD
        .decode(encoded)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(DecryptError::InvalidHeader("invalid header MAC"))
}

fn read_stanza<R: Read>(
    intro: &str,
    lines: &mut LineReader<'_, R>,
) -> Result<Stanza, DecryptError> {
    let (tag, args) = Stanza::parse_intro(intro)?;
    let mut encoded = String::new();
    loop {
        let line = lines.next_line()?;
        if Stanza::parse_body_line(&line, &mut encoded)? {
            break;
        }
    }
    let body = STANDARD_NO_PAD
        .decode(&encoded)
        .map_err(|_| DecryptError::InvalidHeader("invalid stanza body"))?;
    Ok(Stanza { tag, args, body })
}

/// Reads `\n`-terminated header lines one byte at a time, so no payload
/// bytes are consumed past the header, and keeps the raw transcript for the
/// HMAC computation.
struct LineReader<'a, R: Read> {
    inner: &'a mut R,
    transcript: Vec<u8>,
}

impl<'a, R: Read> LineReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            transcript: Vec::new(),
        }
    }

    fn next_line(&mut self) -> Result<String, DecryptError> {
        let start = self.transcript.len();
        loop {
            if self.transcript.len() >= MAX_HEADER_LEN {
                return Err(DecryptError::HeaderTooLarge);
            }
            let mut byte = [0u8; 1];
            match self.inner.read_exact(&mut byte) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(DecryptError::InvalidHeader("truncated header"));
                }
                Err(err) => return Err(err.into()),
            }
            self.transcript.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }

        let line = &self.transcript[start..self.transcript.len() - 1];
        std::str::from_utf8(line)
            .map(str::to_owned)
            .map_err(|_| DecryptError::InvalidHeader("header line is not valid UTF-8"))
    }

    fn transcript(&self) -> &[u8] {
        &self.transcript
    }
}
