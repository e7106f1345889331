//! Text encodings for ciphertext, keys, IVs, tags and AAD.
//!
//! Every scheme is a stateless value registered in a process-wide table.
//! Streaming callers use [`Encoding::multiple`] to keep multi-byte groupings
//! intact across buffer boundaries, see [`chunk`].

pub mod chunk;

use std::borrow::Cow;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
};

use crate::error::{Error, Result};
use crate::resolve;

pub use chunk::{ChunkDecoder, ChunkEncoder};

pub trait Encoding: Send + Sync {
    /// Registry key.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn encode(&self, input: &[u8]) -> String;

    fn decode(&self, text: &str) -> Result<Vec<u8>>;

    /// Re-pads the final, possibly truncated, chunk of a stream before decoding.
    fn padding<'a>(&self, text: &'a str) -> Result<Cow<'a, str>>;

    /// `(bytes, characters)` that encode to / decode from each other without
    /// carrying state across calls.
    fn multiple(&self) -> (usize, usize);
}

/// Standard base64 with `=` padding.
pub struct Base64;

/// URL-safe base64 with `=` padding.
pub struct Base64Url;

/// URL-safe base64 without padding.
pub struct RawBase64Url;

/// Lowercase hexadecimal.
pub struct Hex;

fn pad_base64<'a>(scheme: &'static str, text: &'a str) -> Result<Cow<'a, str>> {
    match text.len() % 4 {
        0 => Ok(Cow::Borrowed(text)),
        2 => Ok(Cow::Owned(format!("{text}=="))),
        3 => Ok(Cow::Owned(format!("{text}="))),
        _ => Err(Error::encoding(
            scheme,
            format!("invalid input length {} (% 4 = 1)", text.len()),
        )),
    }
}

impl Encoding for Base64 {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn description(&self) -> &'static str {
        "base64 encoding"
    }

    fn encode(&self, input: &[u8]) -> String {
        STANDARD.encode(input)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(text)
            .map_err(|e| Error::encoding(self.name(), e))
    }

    fn padding<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        pad_base64(self.name(), text)
    }

    fn multiple(&self) -> (usize, usize) {
        (3, 4)
    }
}

impl Encoding for Base64Url {
    fn name(&self) -> &'static str {
        "base64url"
    }

    fn description(&self) -> &'static str {
        "base64 URL encoding"
    }

    fn encode(&self, input: &[u8]) -> String {
        URL_SAFE.encode(input)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        URL_SAFE
            .decode(text)
            .map_err(|e| Error::encoding(self.name(), e))
    }

    fn padding<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        pad_base64(self.name(), text)
    }

    fn multiple(&self) -> (usize, usize) {
        (3, 4)
    }
}

impl Encoding for RawBase64Url {
    fn name(&self) -> &'static str {
        "rawbase64url"
    }

    fn description(&self) -> &'static str {
        "raw base64 URL encoding"
    }

    fn encode(&self, input: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(input)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| Error::encoding(self.name(), e))
    }

    fn padding<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(text))
    }

    fn multiple(&self) -> (usize, usize) {
        (3, 4)
    }
}

impl Encoding for Hex {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn description(&self) -> &'static str {
        "hex encoding"
    }

    fn encode(&self, input: &[u8]) -> String {
        hex::encode(input)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        hex::decode(text).map_err(|e| Error::encoding(self.name(), e))
    }

    fn padding<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(text))
    }

    fn multiple(&self) -> (usize, usize) {
        (1, 2)
    }
}

static ENCODINGS: [&dyn Encoding; 4] = [&Base64, &Base64Url, &Hex, &RawBase64Url];

pub const DEFAULT: &str = "rawbase64url";

/// Registered encoding names, sorted.
pub fn names() -> Vec<&'static str> {
    ENCODINGS.iter().map(|e| e.name()).collect()
}

pub fn get(name: &str) -> Option<&'static dyn Encoding> {
    ENCODINGS.iter().copied().find(|e| e.name() == name)
}

/// Maps a loosely typed encoding name onto a registered scheme.
pub fn resolve(raw: &str) -> Result<&'static dyn Encoding> {
    let names = names();
    let name = resolve::resolve("encoding scheme", raw, &names, true)?;
    get(name).ok_or_else(|| Error::NotFound {
        kind: "encoding scheme",
        name: raw.to_string(),
    })
}

/// Decodes a complete text value, ignoring ASCII whitespace such as the
/// trailing newline of a text file.
pub fn decode_text(scheme: &dyn Encoding, text: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ChunkDecoder::new(scheme);
    let mut out = decoder.update(text)?;
    out.extend(decoder.finish()?);
    Ok(out)
}
