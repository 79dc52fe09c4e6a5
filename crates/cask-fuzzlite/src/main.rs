#![deny(warnings)]
#![deny(clippy::all)]

//! Drives mutated ciphertexts through the decoder. A run fails by
//! panicking; every mutation must come back as a clean error or a clean
//! decryption, never a crash.

use std::env;
use std::io::{Cursor, Read, Write};

use secrecy::Secret;

use cask_format::armor::{ArmoredWriter, Format};
use cask_format::{scrypt, x25519, Decryptor, Encryptor, Identity, Recipient};

const DEFAULT_ITERS: u64 = 500;
const DEFAULT_SEED: u64 = 0xA5A5_5A5A_1234_5678;
const FUZZ_WORK_FACTOR: u8 = 10;

fn main() {
    let args: Vec<String> = env::args().collect();
    let iters = parse_arg(&args, "--iters")
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ITERS);
    let seed = env::var("CASK_FUZZ_SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SEED);

    let seeds = build_seeds();
    for case in &seeds {
        assert!(
            decrypt_case(case).expect("valid seed must decrypt") == case.plaintext,
            "seed roundtrip mismatch"
        );
    }

    let mut rng = XorShift64::new(seed);
    let mut stats = Stats::default();

    for _ in 0..iters {
        let case = mutate(&mut rng, &seeds);
        match decrypt_case(&case) {
            Ok(plaintext) => {
                // A mutation that still decrypts must not have altered the
                // plaintext.
                assert_eq!(plaintext, case.plaintext, "mutation altered plaintext");
                stats.decrypt_ok += 1;
            }
            Err(()) => stats.rejected += 1,
        }
    }

    println!(
        "fuzz-lite completed: {} iterations (decrypt ok: {}, rejected: {})",
        iters, stats.decrypt_ok, stats.rejected
    );
}

fn parse_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|index| args.get(index + 1))
        .map(|value| value.as_str())
}

#[derive(Default)]
struct Stats {
    decrypt_ok: u64,
    rejected: u64,
}

#[derive(Clone, Copy)]
enum Key {
    X25519([u8; 32]),
    Passphrase(&'static str),
}

struct Case {
    bytes: Vec<u8>,
    key: Key,
    plaintext: Vec<u8>,
}

fn build_seeds() -> Vec<Case> {
    let mut seeds = Vec::new();

    for (seed_byte, len, armored) in [(7u8, 100usize, false), (8, 70000, false), (9, 33, true)] {
        let identity_bytes = [seed_byte; 32];
        let recipient = x25519::Identity::from_bytes(identity_bytes).to_public();
        let plaintext = vec![seed_byte; len];
        let bytes = encrypt(vec![Box::new(recipient)], &plaintext, armored);
        seeds.push(Case {
            bytes,
            key: Key::X25519(identity_bytes),
            plaintext,
        });
    }

    let mut recipient = scrypt::Recipient::new(Secret::new("fuzz passphrase".to_owned()));
    recipient.set_work_factor(FUZZ_WORK_FACTOR);
    let plaintext = b"passphrase seed".to_vec();
    let bytes = encrypt(vec![Box::new(recipient)], &plaintext, false);
    seeds.push(Case {
        bytes,
        key: Key::Passphrase("fuzz passphrase"),
        plaintext,
    });

    seeds
}

fn encrypt(recipients: Vec<Box<dyn Recipient>>, plaintext: &[u8], armored: bool) -> Vec<u8> {
    let format = if armored {
        Format::AsciiArmor
    } else {
        Format::Binary
    };
    let sink = ArmoredWriter::wrap_output(Vec::new(), format).expect("wrap output");
    let encryptor = Encryptor::with_recipients(recipients).expect("recipients");
    let mut writer = encryptor.wrap_output(sink).expect("wrap");
    writer.write_all(plaintext).expect("write");
    writer
        .finish()
        .expect("finish stream")
        .finish()
        .expect("finish armor")
}

fn decrypt_case(case: &Case) -> Result<Vec<u8>, ()> {
    let identity: Box<dyn Identity> = match case.key {
        Key::X25519(bytes) => Box::new(x25519::Identity::from_bytes(bytes)),
        Key::Passphrase(passphrase) => {
            Box::new(scrypt::Identity::new(Secret::new(passphrase.to_owned())))
        }
    };

    let decryptor = Decryptor::new(Cursor::new(case.bytes.clone())).map_err(|_| ())?;
    let mut reader = decryptor
        .decrypt(std::iter::once(identity.as_ref()))
        .map_err(|_| ())?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(|_| ())?;
    Ok(out)
}

fn mutate(rng: &mut XorShift64, seeds: &[Case]) -> Case {
    let source = &seeds[(rng.next_u64() as usize) % seeds.len()];
    let mut bytes = source.bytes.clone();

    match rng.next_u64() % 4 {
        // Flip a single bit.
        0 => {
            let index = (rng.next_u64() as usize) % bytes.len();
            bytes[index] ^= 1u8 << (rng.next_u64() % 8);
        }
        // Truncate.
        1 => {
            let keep = (rng.next_u64() as usize) % (bytes.len() + 1);
            bytes.truncate(keep);
        }
        // Append garbage.
        2 => {
            let extra = (rng.next_u64() % 64) as usize + 1;
            for _ in 0..extra {
                bytes.push(rng.next_u64() as u8);
            }
        }
        // Overwrite a window.
        _ => {
            let start = (rng.next_u64() as usize) % bytes.len();
            let end = (start + 1 + (rng.next_u64() as usize) % 32).min(bytes.len());
            for byte in &mut bytes[start..end] {
                *byte = rng.next_u64() as u8;
            }
        }
    }

    Case {
        bytes,
        key: source.key,
        plaintext: source.plaintext.clone(),
    }
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}
