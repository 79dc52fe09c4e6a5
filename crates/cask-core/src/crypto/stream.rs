//! The chunked payload stream.
//!
//! Plaintext is split into 64 KiB chunks, each sealed independently. The
//! per-chunk nonce is an 11-byte big-endian counter followed by a one-byte
//! "last chunk" flag, so reordering, truncation, and extension are all
//! authentication failures. A plaintext whose length is a non-zero multiple
//! of the chunk size ends in an explicit empty final chunk; empty plaintext
//! is a single empty final chunk.

use std::io::{self, Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::Zeroizing;

use crate::crypto::CryptoError;

pub const CHUNK_SIZE: usize = 64 * 1024;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const LAST_CHUNK_FLAG: u8 = 0x01;

fn chunk_nonce(counter: u64, last: bool) -> Result<Nonce, CryptoError> {
    if !last && counter == u64::MAX {
        return Err(CryptoError::CounterOverflow);
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce[3..11].copy_from_slice(&counter.to_be_bytes());
    nonce[11] = if last { LAST_CHUNK_FLAG } else { 0x00 };
    Ok(Nonce::from(nonce))
}

/// Seals plaintext into the chunked stream.
///
/// Chunks are emitted as soon as 64 KiB is buffered; everything still
/// buffered at [`StreamWriter::finish`] (possibly nothing) becomes the final
/// chunk. `finish` consumes the writer, so writes after close cannot happen.
pub struct StreamWriter<W: Write> {
    aead: ChaCha20Poly1305,
    inner: W,
    buffer: Zeroizing<Vec<u8>>,
    counter: u64,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(key: &[u8; KEY_LEN], inner: W) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key)),
            inner,
            buffer: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
            counter: 0,
        }
    }

    fn seal_chunk(&mut self, last: bool) -> Result<(), CryptoError> {
        let nonce = chunk_nonce(self.counter, last)?;
        let sealed = self
            .aead
            .encrypt(&nonce, self.buffer.as_slice())
            .map_err(|_| CryptoError::AuthFailed)?;
        self.inner.write_all(&sealed)?;
        self.buffer.clear();
        if !last {
            self.counter += 1;
        }
        Ok(())
    }

    /// Seals the final chunk and returns the inner writer.
    pub fn finish(mut self) -> Result<W, CryptoError> {
        self.seal_chunk(true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (CHUNK_SIZE - self.buffer.len()).min(buf.len() - consumed);
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;
            if self.buffer.len() == CHUNK_SIZE {
                self.seal_chunk(false).map_err(io::Error::other)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Opens the chunked stream, yielding plaintext through [`Read`].
///
/// A full-length chunk is never terminal: exact-multiple plaintexts end in
/// an explicit empty chunk, so any chunk shorter than 64 KiB + 16 is the
/// last one and the stream must end with it.
pub struct StreamReader<R: Read> {
    aead: ChaCha20Poly1305,
    inner: R,
    counter: u64,
    plaintext: Zeroizing<Vec<u8>>,
    position: usize,
    done: bool,
}

impl<R: Read> StreamReader<R> {
    pub fn new(key: &[u8; KEY_LEN], inner: R) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key)),
            inner,
            counter: 0,
            plaintext: Zeroizing::new(Vec::new()),
            position: 0,
            done: false,
        }
    }

    fn read_chunk(&mut self) -> Result<(), CryptoError> {
        let mut sealed = vec![0u8; CHUNK_SIZE + TAG_LEN];
        let read = read_full(&mut self.inner, &mut sealed)?;
        if read == 0 {
            return Err(CryptoError::Truncated);
        }
        if read < TAG_LEN {
            return Err(CryptoError::ChunkTooShort(read));
        }
        sealed.truncate(read);

        let last = read < CHUNK_SIZE + TAG_LEN;
        let nonce = chunk_nonce(self.counter, last)?;
        let plaintext = self
            .aead
            .decrypt(&nonce, sealed.as_slice())
            .map_err(|_| CryptoError::AuthFailed)?;

        self.plaintext = Zeroizing::new(plaintext);
        self.position = 0;
        if last {
            self.done = true;
        } else {
            self.counter += 1;
        }
        Ok(())
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.position >= self.plaintext.len() {
            if self.done {
                return Ok(0);
            }
            self.read_chunk().map_err(io::Error::other)?;
        }

        let to_copy = (self.plaintext.len() - self.position).min(out.len());
        out[..to_copy].copy_from_slice(&self.plaintext[self.position..self.position + to_copy]);
        self.position += to_copy;
        Ok(to_copy)
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CryptoError> {
    let mut total = 0usize;
    while total < buf.len() {
        let read = reader.read(&mut buf[total..])?;
        if read == 0 {
            break;
        }
        total += read;
    }
    Ok(total)
}
