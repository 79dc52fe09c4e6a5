//! Parsers for recipient and identity files.
//!
//! One key per line; blank lines and `#` comments are ignored. SSH keys are
//! recognized so the error can point at the SSH provider instead of calling
//! the line garbage.

use std::io::BufRead;

use thiserror::Error;

use crate::protocol::{Identity, Recipient};
use crate::x25519;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Invalid { line: usize, reason: &'static str },
    #[error("line {line}: SSH keys are handled by the SSH provider")]
    UnsupportedSsh { line: usize },
}

const SSH_PREFIXES: [&str; 2] = ["ssh-ed25519 ", "ssh-rsa "];

fn key_entry(line: &str) -> Option<&str> {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }
    Some(entry)
}

fn is_ssh_line(entry: &str) -> bool {
    SSH_PREFIXES.iter().any(|prefix| entry.starts_with(prefix))
}

/// Parses a recipients file: one `age1...` public key per line.
pub fn read_recipients<R: BufRead>(reader: R) -> Result<Vec<Box<dyn Recipient>>, ParseError> {
    let mut recipients: Vec<Box<dyn Recipient>> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(entry) = key_entry(&line) else {
            continue;
        };
        let number = index + 1;
        if is_ssh_line(entry) {
            return Err(ParseError::UnsupportedSsh { line: number });
        }
        let recipient: x25519::Recipient = entry
            .parse()
            .map_err(|reason| ParseError::Invalid {
                line: number,
                reason,
            })?;
        recipients.push(Box::new(recipient));
    }
    Ok(recipients)
}

/// Parses an identities file: one `AGE-SECRET-KEY-1...` secret key per line.
pub fn read_identities<R: BufRead>(reader: R) -> Result<Vec<Box<dyn Identity>>, ParseError> {
    let mut identities: Vec<Box<dyn Identity>> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(entry) = key_entry(&line) else {
            continue;
        };
        let number = index + 1;
        if is_ssh_line(entry) || entry.starts_with("-----BEGIN") {
            return Err(ParseError::UnsupportedSsh { line: number });
        }
        let identity: x25519::Identity = entry
            .parse()
            .map_err(|reason| ParseError::Invalid {
                line: number,
                reason,
            })?;
        identities.push(Box::new(identity));
    }
    Ok(identities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SK: &str =
        "AGE-SECRET-KEY-1GQ9778VQXMMJVE8SK7J6VT8UJ4HDQAJUVSFCWCM02D8GEWQ72PVQ2Y5J33";
    const TEST_PK: &str = "age1t7rxyev2z3rw82stdlrrepyc39nvn86l5078zqkf5uasdy86jp6svpy7pa";

    #[test]
    fn recipients_skip_comments_and_blanks() {
        let file = format!("# a comment\n\n  # indented comment\n{TEST_PK}\n{TEST_PK}  \n");
        let recipients = read_recipients(file.as_bytes()).expect("parse");
        assert_eq!(recipients.len(), 2);
    }

    #[test]
    fn identities_parse_with_crlf_and_no_trailing_newline() {
        let file = format!("{TEST_SK}\r\n{TEST_SK}");
        let identities = read_identities(file.as_bytes()).expect("parse");
        assert_eq!(identities.len(), 2);
    }

    #[test]
    fn bad_key_reports_line_number() {
        let file = format!("# ok\n{TEST_PK}\nnot-a-key\n");
        let err = match read_recipients(file.as_bytes()) {
            Err(e) => e,
            Ok(_) => panic!("must fail"),
        };
        assert!(matches!(err, ParseError::Invalid { line: 3, .. }));
    }

    #[test]
    fn ssh_lines_point_at_the_ssh_provider() {
        let err = match read_recipients("ssh-ed25519 AAAAC3Nz host\n".as_bytes()) {
            Err(e) => e,
            Ok(_) => panic!("ssh"),
        };
        assert!(matches!(err, ParseError::UnsupportedSsh { line: 1 }));
    }

    #[test]
    fn secret_keys_are_not_recipients() {
        assert!(read_recipients(format!("{TEST_SK}\n").as_bytes()).is_err());
    }
}
