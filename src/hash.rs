//! Message digests over a stream: the SHA-2 family, plus SHA-1 and MD5 for
//! checksum compatibility.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::Result;
use crate::resolve;
use crate::stream::{self, Input};

pub const DEFAULT: &str = "sha256";

const NAMES: &[&str] = &["sha224", "sha256", "sha384", "sha512", "sha1", "md5"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha1,
    Md5,
}

impl HashKind {
    pub fn name(&self) -> &'static str {
        match self {
            HashKind::Sha224 => "sha224",
            HashKind::Sha256 => "sha256",
            HashKind::Sha384 => "sha384",
            HashKind::Sha512 => "sha512",
            HashKind::Sha1 => "sha1",
            HashKind::Md5 => "md5",
        }
    }
}

pub fn names() -> &'static [&'static str] {
    NAMES
}

pub fn resolve(raw: &str) -> Result<HashKind> {
    let kind = match resolve::resolve("hash algorithm", raw, NAMES, true)? {
        "sha224" => HashKind::Sha224,
        "sha384" => HashKind::Sha384,
        "sha512" => HashKind::Sha512,
        "sha1" => HashKind::Sha1,
        "md5" => HashKind::Md5,
        _ => HashKind::Sha256,
    };
    Ok(kind)
}

fn digest_with<D: Digest>(input: &mut Input, buffer: usize) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    stream::buffered_read(input, buffer, |chunk| {
        hasher.update(chunk);
        Ok(())
    })?;
    Ok(hasher.finalize().to_vec())
}

pub fn digest(kind: HashKind, input: &mut Input, buffer: usize) -> Result<Vec<u8>> {
    match kind {
        HashKind::Sha224 => digest_with::<Sha224>(input, buffer),
        HashKind::Sha256 => digest_with::<Sha256>(input, buffer),
        HashKind::Sha384 => digest_with::<Sha384>(input, buffer),
        HashKind::Sha512 => digest_with::<Sha512>(input, buffer),
        HashKind::Sha1 => digest_with::<Sha1>(input, buffer),
        HashKind::Md5 => digest_with::<Md5>(input, buffer),
    }
}
