//! Text-safe wrapping of the binary container.
//!
//! The body is standard padded base64 wrapped at 64 columns between BEGIN
//! and END marker lines. The reader is strict: over-long lines, trailing
//! whitespace, padding before the final line, and any bytes after the END
//! marker are all rejected.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

pub(crate) const BEGIN_MARKER: &str = "-----BEGIN AGE ENCRYPTED FILE-----";
pub(crate) const END_MARKER: &str = "-----END AGE ENCRYPTED FILE-----";

const LINE_LEN: usize = 64;
const BYTES_PER_LINE: usize = LINE_LEN / 4 * 3;

#[derive(Debug, Error)]
pub enum ArmorError {
    #[error("armor line longer than {LINE_LEN} characters")]
    LineTooLong,
    #[error("trailing whitespace on an armor line")]
    TrailingWhitespace,
    #[error("invalid armor base64")]
    InvalidBase64,
    #[error("armor body continues after a short line")]
    UnexpectedLine,
    #[error("data after the armor end marker")]
    TrailingData,
    #[error("armor ends without an end marker")]
    Truncated,
}

fn invalid(err: ArmorError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Selects whether output is armored; [`ArmoredWriter`] in `Binary` mode is
/// a passthrough, so callers can treat both uniformly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Binary,
    AsciiArmor,
}

/// A reader that transparently dearmors armored input and passes every
/// other byte stream through unchanged.
pub struct ArmoredReader<R: Read> {
    inner: R,
    armored: bool,
    // Peeked bytes to replay in passthrough mode.
    prefix: Vec<u8>,
    prefix_pos: usize,
    decoded: Vec<u8>,
    decoded_pos: usize,
    expect_end: bool,
    finished: bool,
}

impl<R: Read> ArmoredReader<R> {
    /// Peeks exactly enough bytes to recognize the BEGIN marker line.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let mut peeked = vec![0u8; BEGIN_MARKER.len() + 1];
        let mut filled = 0;
        while filled < peeked.len() {
            let read = inner.read(&mut peeked[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        peeked.truncate(filled);

        let armored = peeked.len() == BEGIN_MARKER.len() + 1
            && &peeked[..BEGIN_MARKER.len()] == BEGIN_MARKER.as_bytes()
            && peeked[BEGIN_MARKER.len()] == b'\n';

        Ok(Self {
            inner,
            armored,
            prefix: if armored { Vec::new() } else { peeked },
            prefix_pos: 0,
            decoded: Vec::new(),
            decoded_pos: 0,
            expect_end: false,
            finished: false,
        })
    }

    pub fn is_armored(&self) -> bool {
        self.armored
    }

    fn next_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.inner.read_exact(&mut byte) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(invalid(ArmorError::Truncated));
                }
                Err(err) => return Err(err),
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > LINE_LEN {
                return Err(invalid(ArmorError::LineTooLong));
            }
        }
        String::from_utf8(line).map_err(|_| invalid(ArmorError::InvalidBase64))
    }

    fn fill_decoded(&mut self) -> io::Result<()> {
        let line = self.next_line()?;

        if line == END_MARKER {
            self.ensure_eof()?;
            self.finished = true;
            return Ok(());
        }
        if self.expect_end {
            return Err(invalid(ArmorError::UnexpectedLine));
        }
        if line.trim_end() != line {
            return Err(invalid(ArmorError::TrailingWhitespace));
        }

        let decoded = STANDARD
            .decode(line.as_bytes())
            .map_err(|_| invalid(ArmorError::InvalidBase64))?;
        // A short or padded line is the final body line.
        if line.len() < LINE_LEN || line.contains('=') {
            self.expect_end = true;
        }
        self.decoded = decoded;
        self.decoded_pos = 0;
        Ok(())
    }

    fn ensure_eof(&mut self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte)? {
            0 => Ok(()),
            _ => Err(invalid(ArmorError::TrailingData)),
        }
    }
}

impl<R: Read> Read for ArmoredReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if !self.armored {
            if self.prefix_pos < self.prefix.len() {
                let to_copy = (self.prefix.len() - self.prefix_pos).min(out.len());
                out[..to_copy]
                    .copy_from_slice(&self.prefix[self.prefix_pos..self.prefix_pos + to_copy]);
                self.prefix_pos += to_copy;
                return Ok(to_copy);
            }
            return self.inner.read(out);
        }

        while self.decoded_pos >= self.decoded.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill_decoded()?;
        }

        let to_copy = (self.decoded.len() - self.decoded_pos).min(out.len());
        out[..to_copy].copy_from_slice(&self.decoded[self.decoded_pos..self.decoded_pos + to_copy]);
        self.decoded_pos += to_copy;
        Ok(to_copy)
    }
}

/// A writer that armors its output, or passes through in `Binary` mode.
///
/// [`ArmoredWriter::finish`] writes the final partial line and the END
/// marker; dropping the writer without it leaves the armor unterminated.
pub struct ArmoredWriter<W: Write> {
    inner: W,
    format: Format,
    buffer: Vec<u8>,
}

impl<W: Write> ArmoredWriter<W> {
    pub fn wrap_output(mut inner: W, format: Format) -> io::Result<Self> {
        if format == Format::AsciiArmor {
            inner.write_all(BEGIN_MARKER.as_bytes())?;
            inner.write_all(b"\n")?;
        }
        Ok(Self {
            inner,
            format,
            buffer: Vec::with_capacity(BYTES_PER_LINE),
        })
    }

    fn write_line(&mut self) -> io::Result<()> {
        let line = STANDARD.encode(&self.buffer);
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.buffer.clear();
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        if self.format == Format::AsciiArmor {
            if !self.buffer.is_empty() {
                self.write_line()?;
            }
            self.inner.write_all(END_MARKER.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ArmoredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.format == Format::Binary {
            return self.inner.write(buf);
        }

        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (BYTES_PER_LINE - self.buffer.len()).min(buf.len() - consumed);
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;
            if self.buffer.len() == BYTES_PER_LINE {
                self.write_line()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
