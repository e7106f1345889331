//! Bounded-buffer input reading.

use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, IsTerminal};
use std::path::Path;

use crate::encoding::{ChunkDecoder, ChunkEncoder, Encoding};
use crate::error::Result;

/// Default read buffer size (1 MiB).
pub const DEFAULT_BUFFER: usize = 1024 * 1024;

/// An input source and whether it is an interactive terminal.
pub struct Input {
    pub reader: Box<dyn BufRead>,
    pub interactive: bool,
}

impl Input {
    /// Opens `path`, or stdin when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self {
                reader: Box::new(BufReader::new(File::open(path)?)),
                interactive: false,
            }),
            None => Ok(Self {
                interactive: io::stdin().is_terminal(),
                reader: Box::new(io::stdin().lock()),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            interactive: false,
        }
    }
}

fn is_terminator(line: &[u8]) -> bool {
    matches!(line, b"." | b".\n" | b".\r\n")
}

/// Feeds the input to `action` in chunks of at most `buffer` bytes.
///
/// Interactive input is read line by line instead, and a line holding a
/// single `.` ends it.
pub fn buffered_read(
    input: &mut Input,
    buffer: usize,
    mut action: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    if input.interactive {
        let mut line = Vec::new();
        loop {
            line.clear();
            if input.reader.read_until(b'\n', &mut line)? == 0 || is_terminator(&line) {
                return Ok(());
            }
            action(&line)?;
        }
    }

    let mut buf = vec![0u8; buffer.max(1)];
    loop {
        let n = match input.reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        action(&buf[..n])?;
    }
}

/// Reads the whole input, decoding it as text when `decoder` is set.
pub fn read_all(
    input: &mut Input,
    buffer: usize,
    decoder: Option<&dyn Encoding>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match decoder {
        None => buffered_read(input, buffer, |chunk| {
            out.extend_from_slice(chunk);
            Ok(())
        })?,
        Some(scheme) => {
            let mut decoder = ChunkDecoder::new(scheme);
            buffered_read(input, buffer, |chunk| {
                out.extend(decoder.update(chunk)?);
                Ok(())
            })?;
            out.extend(decoder.finish()?);
        }
    }
    Ok(out)
}

/// Reads the whole input and returns it as encoded text.
pub fn encode_all(input: &mut Input, buffer: usize, scheme: &dyn Encoding) -> Result<String> {
    let mut encoder = ChunkEncoder::new(scheme);
    let mut out = String::new();
    buffered_read(input, buffer, |chunk| {
        out.push_str(&encoder.update(chunk));
        Ok(())
    })?;
    out.push_str(&encoder.finish());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{Base64, Hex};
    use std::io::Cursor;

    fn input(data: &[u8], interactive: bool) -> Input {
        Input {
            reader: Box::new(Cursor::new(data.to_vec())),
            interactive,
        }
    }

    #[test]
    fn chunks_never_exceed_buffer() {
        let mut sizes = Vec::new();
        buffered_read(&mut input(&[1u8; 10], false), 4, |c| {
            sizes.push(c.len());
            Ok(())
        })
        .unwrap();
        assert!(sizes.iter().all(|&n| n <= 4));
        assert_eq!(sizes.iter().sum::<usize>(), 10);
    }

    #[test]
    fn interactive_input_stops_at_dot_line() {
        let mut src = input(b"first\nsecond\r\n.\r\nignored\n", true);
        assert_eq!(read_all(&mut src, 64, None).unwrap(), b"first\nsecond\r\n");

        let mut src = input(b"only\n.\n", true);
        assert_eq!(read_all(&mut src, 64, None).unwrap(), b"only\n");
    }

    #[test]
    fn dot_is_plain_data_when_not_interactive() {
        let mut src = input(b"a\n.\nb", false);
        assert_eq!(read_all(&mut src, 2, None).unwrap(), b"a\n.\nb");
    }

    #[test]
    fn decodes_across_tiny_buffers() {
        let text = Base64.encode(b"streamed in pieces");
        let mut src = input(text.as_bytes(), false);
        assert_eq!(
            read_all(&mut src, 3, Some(&Base64)).unwrap(),
            b"streamed in pieces"
        );
    }

    #[test]
    fn encode_all_matches_one_shot() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut src = input(&data, false);
        assert_eq!(encode_all(&mut src, 7, &Hex).unwrap(), Hex.encode(&data));
    }
}
