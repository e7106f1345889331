//! Incremental encode/decode that never splits a byte/character group.

use super::Encoding;
use crate::error::{Error, Result};

/// Buffers raw bytes until a whole number of encode units is available.
pub struct ChunkEncoder<'s> {
    scheme: &'s dyn Encoding,
    pending: Vec<u8>,
}

impl<'s> ChunkEncoder<'s> {
    pub fn new(scheme: &'s dyn Encoding) -> Self {
        Self {
            scheme,
            pending: Vec::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) -> String {
        let (unit, _) = self.scheme.multiple();
        self.pending.extend_from_slice(chunk);
        let ready = self.pending.len() - self.pending.len() % unit;
        if ready == 0 {
            return String::new();
        }
        let encoded = self.scheme.encode(&self.pending[..ready]);
        self.pending.drain(..ready);
        encoded
    }

    pub fn finish(self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.scheme.encode(&self.pending)
    }
}

/// Buffers text until a whole number of decode units is available.
///
/// ASCII whitespace is dropped before grouping. The final group is passed
/// through [`Encoding::padding`] so truncated or unpadded text still decodes.
pub struct ChunkDecoder<'s> {
    scheme: &'s dyn Encoding,
    pending: Vec<u8>,
}

impl<'s> ChunkDecoder<'s> {
    pub fn new(scheme: &'s dyn Encoding) -> Self {
        Self {
            scheme,
            pending: Vec::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let (_, unit) = self.scheme.multiple();
        self.pending
            .extend(chunk.iter().filter(|b| !b.is_ascii_whitespace()));
        let ready = self.pending.len() - self.pending.len() % unit;
        if ready == 0 {
            return Ok(Vec::new());
        }
        let decoded = self.scheme.decode(self.text(ready)?)?;
        self.pending.drain(..ready);
        Ok(decoded)
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let text = self.text(self.pending.len())?;
        let padded = self.scheme.padding(text)?;
        self.scheme.decode(&padded)
    }

    fn text(&self, len: usize) -> Result<&str> {
        std::str::from_utf8(&self.pending[..len])
            .map_err(|e| Error::encoding(self.scheme.name(), e))
    }
}
