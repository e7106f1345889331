//! Encryption algorithms behind one capability contract.
//!
//! Every registered algorithm is constructed fresh for each invocation and
//! owns its key material exclusively. Nothing is shared between instances.

pub mod aead;
pub mod cbc;
pub mod ecies;
pub mod keyparse;
pub mod rsa;

use std::fmt;
use std::sync::LazyLock;

use getrandom::fill;
use regex::Regex;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::resolve;

pub use self::aead::{Aes128Gcm, Aes192Gcm, Aes256Gcm, AeadAlgorithm, ChaCha20Poly1305};
pub use self::cbc::Aes256Cbc;
pub use self::ecies::Secp256k1Ecies;
pub use self::rsa::{Padding, RsaAlgorithm};

pub const DEFAULT: &str = "ChaCha20-Poly1305";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Symmetric,
    Asymmetric,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Symmetric => "sym",
            Family::Asymmetric => "asym",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Unset,
    /// Full key (symmetric key or asymmetric private key).
    Populated,
    /// Asymmetric public half only; encryption works, decryption does not.
    PublicOnly,
}

/// Optional inputs to [`Algorithm::encrypt`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptParams<'a> {
    /// Externally supplied nonce/IV. When present it is not embedded in the output.
    pub iv: Option<&'a [u8]>,
    pub aad: Option<&'a [u8]>,
}

/// Optional inputs to [`Algorithm::decrypt`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DecryptParams<'a> {
    /// When present the ciphertext carries no embedded nonce.
    pub iv: Option<&'a [u8]>,
    /// When present the ciphertext carries no trailing tag.
    pub tag: Option<&'a [u8]>,
    pub aad: Option<&'a [u8]>,
}

/// Encryption result laid out as `[nonce][body][tag]`.
///
/// `nonce_len` is zero when the nonce was supplied externally, `tag_len` is
/// zero for unauthenticated or asymmetric output.
#[derive(Debug, Clone)]
pub struct Sealed {
    bytes: Vec<u8>,
    nonce_len: usize,
    tag_len: usize,
}

impl Sealed {
    pub fn new(bytes: Vec<u8>, nonce_len: usize, tag_len: usize) -> Self {
        debug_assert!(nonce_len + tag_len <= bytes.len());
        Self {
            bytes,
            nonce_len,
            tag_len,
        }
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[..self.nonce_len]
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[self.nonce_len..self.bytes.len() - self.tag_len]
    }

    pub fn tag(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - self.tag_len..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Splits off the tag, returning `([nonce][body], tag)`.
    pub fn detach_tag(mut self) -> (Vec<u8>, Vec<u8>) {
        let tag = self.bytes.split_off(self.bytes.len() - self.tag_len);
        (self.bytes, tag)
    }
}

pub trait Algorithm {
    /// Canonical registry name.
    fn name(&self) -> &'static str;

    fn family(&self) -> Family;

    fn is_symmetric(&self) -> bool {
        self.family() == Family::Symmetric
    }

    /// Bytes for symmetric algorithms, bits for asymmetric ones.
    fn key_length(&self) -> usize;

    fn key_state(&self) -> KeyState;

    /// Nonce/IV length embedded in front of the ciphertext, if any.
    fn nonce_length(&self) -> usize {
        0
    }

    /// Authentication tag length, zero for unauthenticated modes.
    fn tag_length(&self) -> usize {
        0
    }

    /// `None` generates fresh key material, `Some` adopts the given bytes.
    fn populate_key(&mut self, material: Option<&[u8]>) -> Result<()>;

    /// Raw key bytes (symmetric) or the private key as PEM (asymmetric).
    fn export_key(&self) -> Result<Zeroizing<Vec<u8>>>;

    fn encrypt(&self, plaintext: &[u8], params: &EncryptParams<'_>) -> Result<Sealed>;

    fn decrypt(&self, input: &[u8], params: &DecryptParams<'_>) -> Result<Zeroizing<Vec<u8>>>;
}

impl fmt::Debug for dyn Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Algorithm")
            .field("name", &self.name())
            .field("family", &self.family())
            .field("key", &self.key_state())
            .finish()
    }
}

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|e| Error::crypto(format!("OS random generator unavailable: {e}")))
}

pub(crate) fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    secure_random(&mut buf)?;
    Ok(buf)
}

struct Entry {
    name: &'static str,
    family: Family,
    build: fn() -> Box<dyn Algorithm>,
}

fn aes_128_gcm() -> Box<dyn Algorithm> {
    Box::new(Aes128Gcm::new("AES-128-GCM"))
}

fn aes_192_gcm() -> Box<dyn Algorithm> {
    Box::new(Aes192Gcm::new("AES-192-GCM"))
}

fn aes_256_gcm() -> Box<dyn Algorithm> {
    Box::new(Aes256Gcm::new("AES-256-GCM"))
}

fn aes_256_cbc() -> Box<dyn Algorithm> {
    Box::new(Aes256Cbc::default())
}

fn chacha20_poly1305() -> Box<dyn Algorithm> {
    Box::new(ChaCha20Poly1305::new("ChaCha20-Poly1305"))
}

fn ecies_secp256k1() -> Box<dyn Algorithm> {
    Box::new(Secp256k1Ecies::default())
}

fn rsa_2048_oaep_sha256() -> Box<dyn Algorithm> {
    Box::new(RsaAlgorithm::new("RSA-2048-OAEP-SHA256", 2048, Padding::OaepSha256))
}

fn rsa_2048_oaep_sha512() -> Box<dyn Algorithm> {
    Box::new(RsaAlgorithm::new("RSA-2048-OAEP-SHA512", 2048, Padding::OaepSha512))
}

fn rsa_2048_pkcs1v15() -> Box<dyn Algorithm> {
    Box::new(RsaAlgorithm::new("RSA-2048-PKCS1v15", 2048, Padding::Pkcs1v15))
}

fn rsa_4096_oaep_sha512() -> Box<dyn Algorithm> {
    Box::new(RsaAlgorithm::new("RSA-4096-OAEP-SHA512", 4096, Padding::OaepSha512))
}

// sorted by name
static REGISTRY: &[Entry] = &[
    Entry {
        name: "AES-128-GCM",
        family: Family::Symmetric,
        build: aes_128_gcm,
    },
    Entry {
        name: "AES-192-GCM",
        family: Family::Symmetric,
        build: aes_192_gcm,
    },
    Entry {
        name: "AES-256-CBC",
        family: Family::Symmetric,
        build: aes_256_cbc,
    },
    Entry {
        name: "AES-256-GCM",
        family: Family::Symmetric,
        build: aes_256_gcm,
    },
    Entry {
        name: "ChaCha20-Poly1305",
        family: Family::Symmetric,
        build: chacha20_poly1305,
    },
    Entry {
        name: "ECIES-SECP256K1",
        family: Family::Asymmetric,
        build: ecies_secp256k1,
    },
    Entry {
        name: "RSA-2048-OAEP-SHA256",
        family: Family::Asymmetric,
        build: rsa_2048_oaep_sha256,
    },
    Entry {
        name: "RSA-2048-OAEP-SHA512",
        family: Family::Asymmetric,
        build: rsa_2048_oaep_sha512,
    },
    Entry {
        name: "RSA-2048-PKCS1v15",
        family: Family::Asymmetric,
        build: rsa_2048_pkcs1v15,
    },
    Entry {
        name: "RSA-4096-OAEP-SHA512",
        family: Family::Asymmetric,
        build: rsa_4096_oaep_sha512,
    },
];

/// Registered algorithms with their family, optionally restricted to one family.
pub fn list(family: Option<Family>) -> Vec<(&'static str, Family)> {
    REGISTRY
        .iter()
        .filter(|e| family.is_none_or(|f| f == e.family))
        .map(|e| (e.name, e.family))
        .collect()
}

pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|e| e.name).collect()
}

/// Fresh, key-less instance of a canonical algorithm.
pub fn get(name: &str) -> Option<Box<dyn Algorithm>> {
    REGISTRY.iter().find(|e| e.name == name).map(|e| (e.build)())
}

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]?[A-Za-z]+)-?([0-9]*)-?([A-Za-z0-9]*?)-?([A-Za-z0-9]*?)$")
        .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Re-synthesizes a canonical name from a structured token such as
/// `A256GCM`, `AES-192-CBC`, `RSA-OAEP-256` or `RSA-2048-PKCS1v15`.
///
/// Returns `None` when the token does not have the expected shape or a
/// numeric field does not parse. The result is not checked against the
/// registry.
pub fn parse_name(token: &str) -> Option<String> {
    let caps = NAME_PATTERN.captures(token)?;
    let family = caps[1].to_ascii_uppercase();
    let size = &caps[2];
    let mode = &caps[3];
    let submode = &caps[4];

    let join = |parts: &[&str]| {
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("-")
    };

    match family.as_str() {
        "A" | "AES" => {
            let bits: u32 = size.parse().ok()?;
            let mode = join(&[mode, submode]).to_ascii_uppercase();
            Some(join(&["AES", &bits.to_string(), &mode]))
        }
        "CHACHA" => (size == "20" && submode.eq_ignore_ascii_case("Poly1305"))
            .then(|| "ChaCha20-Poly1305".to_string()),
        "RSA" => {
            let bits: u32 = if size.is_empty() {
                2048
            } else {
                size.parse().ok()?
            };
            let hash = match submode.parse::<u32>() {
                Ok(n) => format!("SHA{n}"),
                Err(_) => rsa_token(submode),
            };
            if mode.eq_ignore_ascii_case("OAEP") {
                Some(format!("RSA-{bits}-OAEP-{hash}"))
            } else {
                Some(join(&["RSA", &bits.to_string(), &rsa_token(mode), &hash]))
            }
        }
        "SECP" | "ECIES" => Some("ECIES-SECP256K1".to_string()),
        _ => None,
    }
}

fn rsa_token(s: &str) -> String {
    if s.eq_ignore_ascii_case("PKCS1v15") {
        "PKCS1v15".to_string()
    } else {
        s.to_ascii_uppercase()
    }
}

/// Maps a loosely typed algorithm name onto a fresh registered instance.
///
/// Order: exact name, structured parse (only if the result is registered),
/// then fuzzy matching.
pub fn resolve(raw: &str) -> Result<Box<dyn Algorithm>> {
    let names = names();
    let name = if names.contains(&raw) {
        raw.to_string()
    } else if let Some(parsed) = parse_name(raw).filter(|n| names.contains(&n.as_str())) {
        tracing::debug!(raw, name = %parsed, "parsed algorithm name");
        parsed
    } else {
        resolve::resolve("algorithm", raw, &names, true)?.to_string()
    };
    get(&name).ok_or(Error::NotFound {
        kind: "algorithm",
        name,
    })
}
