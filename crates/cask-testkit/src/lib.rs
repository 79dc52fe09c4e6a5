#![deny(warnings)]
#![deny(clippy::all)]

//! Byte-level fixtures for exercising the header parser. The header format
//! is textual, so these are built from strings; the MAC in
//! [`sample_header_string`] is well-formed base64 but not a valid HMAC,
//! which only matters once an identity has recovered a file key.

pub const TEST_SK: &str =
    "AGE-SECRET-KEY-1GQ9778VQXMMJVE8SK7J6VT8UJ4HDQAJUVSFCWCM02D8GEWQ72PVQ2Y5J33";
pub const TEST_PK: &str = "age1t7rxyev2z3rw82stdlrrepyc39nvn86l5078zqkf5uasdy86jp6svpy7pa";

pub const V1_INTRO: &str = "age-encryption.org/v1";

// 43 unpadded base64 characters decode to 32 bytes, the size of both a
// wrapped file key and the header MAC.
const B64_32_BYTES: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub fn sample_stanza_lines() -> String {
    format!("-> X25519 {B64_32_BYTES}\n{B64_32_BYTES}\n")
}

pub fn sample_header_string() -> String {
    format!("{V1_INTRO}\n{}--- {B64_32_BYTES}\n", sample_stanza_lines())
}

pub fn sample_header_bytes() -> Vec<u8> {
    sample_header_string().into_bytes()
}

pub fn invalid_intro_bytes() -> Vec<u8> {
    let mut bytes = sample_header_bytes();
    bytes[0] ^= 0x20;
    bytes
}

pub fn truncated_header_bytes() -> Vec<u8> {
    let mut bytes = sample_header_bytes();
    bytes.truncate(bytes.len() / 2);
    bytes
}

/// A header whose only stanza ends on a 64-column body line, which the
/// parser must treat as a continuation and then reject.
pub fn full_final_body_line_bytes() -> Vec<u8> {
    let body = "A".repeat(64);
    format!("{V1_INTRO}\n-> X25519 {B64_32_BYTES}\n{body}\n--- {B64_32_BYTES}\n").into_bytes()
}

/// Two spaces between stanza tokens.
pub fn doubled_space_stanza_bytes() -> Vec<u8> {
    format!("{V1_INTRO}\n-> X25519  {B64_32_BYTES}\n{B64_32_BYTES}\n--- {B64_32_BYTES}\n")
        .into_bytes()
}

/// The MAC line arrives before any stanza.
pub fn missing_stanza_bytes() -> Vec<u8> {
    format!("{V1_INTRO}\n--- {B64_32_BYTES}\n").into_bytes()
}

/// A stanza body with padding, which the unpadded encoding forbids.
pub fn padded_body_bytes() -> Vec<u8> {
    format!("{V1_INTRO}\n-> X25519 {B64_32_BYTES}\nQUJD=\n--- {B64_32_BYTES}\n").into_bytes()
}

/// An endless stanza body that blows through the header size cap.
pub fn oversized_header_bytes() -> Vec<u8> {
    let mut header = format!("{V1_INTRO}\n-> X25519 {B64_32_BYTES}\n");
    let full_line = "A".repeat(64);
    for _ in 0..1100 {
        header.push_str(&full_line);
        header.push('\n');
    }
    header.into_bytes()
}
