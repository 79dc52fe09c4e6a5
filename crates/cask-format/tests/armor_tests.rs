use std::io::{Read, Write};

use cask_format::armor::{ArmoredReader, ArmoredWriter, Format};

fn armor(data: &[u8]) -> Vec<u8> {
    let mut writer =
        ArmoredWriter::wrap_output(Vec::new(), Format::AsciiArmor).expect("wrap output");
    writer.write_all(data).expect("write");
    writer.finish().expect("finish")
}

fn dearmor(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut reader = ArmoredReader::new(bytes)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn armor_roundtrips_at_line_boundaries() {
    for len in [0usize, 1, 47, 48, 49, 96, 100, 6000] {
        let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
        assert_eq!(dearmor(&armor(&data)).expect("dearmor"), data, "len {len}");
    }
}

#[test]
fn armor_line_discipline() {
    let armored = armor(&vec![0xA5u8; 1000]);
    let text = String::from_utf8(armored).expect("utf-8");
    let lines: Vec<&str> = text.trim_end().split('\n').collect();
    assert_eq!(lines.first(), Some(&"-----BEGIN AGE ENCRYPTED FILE-----"));
    assert_eq!(lines.last(), Some(&"-----END AGE ENCRYPTED FILE-----"));
    for line in &lines {
        assert!(line.len() <= 64, "line too long: {line}");
        assert_eq!(line.trim_end(), *line);
    }
}

#[test]
fn binary_format_is_a_passthrough() {
    let mut writer = ArmoredWriter::wrap_output(Vec::new(), Format::Binary).expect("wrap output");
    writer.write_all(b"raw bytes").expect("write");
    assert_eq!(writer.finish().expect("finish"), b"raw bytes");
}

#[test]
fn non_armored_input_streams_through_unchanged() {
    for data in [&b""[..], b"x", b"age-encryption.org/v1\n", &[0u8; 200]] {
        assert_eq!(dearmor(data).expect("passthrough"), data);
    }
}

#[test]
fn data_after_end_marker_is_rejected() {
    let mut armored = armor(b"payload");
    armored.extend_from_slice(b"trailing");
    assert!(dearmor(&armored).is_err());

    let mut armored = armor(b"payload");
    armored.push(b'\n');
    assert!(dearmor(&armored).is_err());
}

#[test]
fn overlong_line_is_rejected() {
    let armored = format!(
        "-----BEGIN AGE ENCRYPTED FILE-----\n{}\n-----END AGE ENCRYPTED FILE-----\n",
        "A".repeat(68)
    );
    assert!(dearmor(armored.as_bytes()).is_err());
}

#[test]
fn trailing_whitespace_is_rejected() {
    let armored = "-----BEGIN AGE ENCRYPTED FILE-----\nQUJD \n-----END AGE ENCRYPTED FILE-----\n";
    assert!(dearmor(armored.as_bytes()).is_err());
}

#[test]
fn non_base64_bytes_are_rejected() {
    let armored = "-----BEGIN AGE ENCRYPTED FILE-----\nQUJ#\n-----END AGE ENCRYPTED FILE-----\n";
    assert!(dearmor(armored.as_bytes()).is_err());
}

#[test]
fn body_after_a_short_line_is_rejected() {
    let armored = format!(
        "-----BEGIN AGE ENCRYPTED FILE-----\nQUJD\n{}\n-----END AGE ENCRYPTED FILE-----\n",
        "Q".repeat(64)
    );
    assert!(dearmor(armored.as_bytes()).is_err());
}

#[test]
fn missing_end_marker_is_rejected() {
    let armored = "-----BEGIN AGE ENCRYPTED FILE-----\nQUJD\n";
    assert!(dearmor(armored.as_bytes()).is_err());
}
