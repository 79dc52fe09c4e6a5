use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::DecryptError;

pub(crate) const STANZA_PREFIX: &str = "-> ";
pub(crate) const BODY_LINE_LEN: usize = 64;

/// One recipient's wrapping of the file key, as carried in the header.
///
/// The wire form is `-> TAG ARG...` followed by the body in unpadded
/// base64, 64 columns per line, the final line strictly shorter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stanza {
    pub tag: String,
    pub args: Vec<String>,
    pub body: Vec<u8>,
}

impl Stanza {
    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "-> {}", self.tag)?;
        for arg in &self.args {
            write!(writer, " {arg}")?;
        }
        writer.write_all(b"\n")?;

        let encoded = STANDARD_NO_PAD.encode(&self.body);
        let bytes = encoded.as_bytes();
        let mut offset = 0;
        loop {
            let end = (offset + BODY_LINE_LEN).min(bytes.len());
            writer.write_all(&bytes[offset..end])?;
            writer.write_all(b"\n")?;
            // A final line of exactly 64 columns would be ambiguous with a
            // continuation, so such bodies get a trailing empty line.
            if end - offset < BODY_LINE_LEN {
                break;
            }
            offset = end;
        }
        Ok(())
    }

    pub(crate) fn parse_intro(line: &str) -> Result<(String, Vec<String>), DecryptError> {
        let rest = line
            .strip_prefix(STANZA_PREFIX)
            .ok_or(DecryptError::InvalidHeader("expected a stanza"))?;

        let mut tokens = rest.split(' ');
        let tag = tokens
            .next()
            .filter(|tag| is_valid_token(tag))
            .ok_or(DecryptError::InvalidHeader("invalid stanza tag"))?
            .to_owned();

        let mut args = Vec::new();
        for token in tokens {
            if !is_valid_token(token) {
                return Err(DecryptError::InvalidHeader("invalid stanza argument"));
            }
            args.push(token.to_owned());
        }
        Ok((tag, args))
    }

    /// Appends one body line; returns true when the line terminates the
    /// body (strictly shorter than 64 columns).
    pub(crate) fn parse_body_line(line: &str, body: &mut String) -> Result<bool, DecryptError> {
        if line.len() > BODY_LINE_LEN {
            return Err(DecryptError::InvalidHeader("stanza body line too long"));
        }
        if !line.bytes().all(is_base64_byte) {
            return Err(DecryptError::InvalidHeader("invalid stanza body"));
        }
        body.push_str(line);
        Ok(line.len() < BODY_LINE_LEN)
    }
}

/// Stanza tags and arguments are printable ASCII with no whitespace.
fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|byte| (33..=126).contains(&byte))
}

// The body alphabet excludes '='; stanza bodies are unpadded.
fn is_base64_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(stanza: &Stanza) -> String {
        let mut buf = Vec::new();
        stanza.write(&mut buf).expect("write");
        String::from_utf8(buf).expect("utf-8")
    }

    #[test]
    fn empty_body_still_has_a_body_line() {
        let stanza = Stanza {
            tag: "X25519".into(),
            args: vec!["abc".into()],
            body: Vec::new(),
        };
        assert_eq!(rendered(&stanza), "-> X25519 abc\n\n");
    }

    #[test]
    fn full_line_body_gets_trailing_empty_line() {
        // 48 bytes encode to exactly 64 columns.
        let stanza = Stanza {
            tag: "t".into(),
            args: vec![],
            body: vec![0u8; 48],
        };
        let out = rendered(&stanza);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2], "");
    }

    #[test]
    fn long_body_wraps_at_64_columns() {
        let stanza = Stanza {
            tag: "t".into(),
            args: vec![],
            body: vec![0u8; 60],
        };
        let out = rendered(&stanza);
        let lines: Vec<&str> = out.trim_end().split('\n').collect();
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 16);
    }

    #[test]
    fn intro_rejects_extra_spaces() {
        assert!(Stanza::parse_intro("-> X25519  abc").is_err());
        assert!(Stanza::parse_intro("-> X25519 abc ").is_err());
        assert!(Stanza::parse_intro("->  X25519").is_err());
    }

    #[test]
    fn body_rejects_padding_and_foreign_bytes() {
        let mut body = String::new();
        assert!(Stanza::parse_body_line("abc=", &mut body).is_err());
        assert!(Stanza::parse_body_line("ab c", &mut body).is_err());
    }
}
