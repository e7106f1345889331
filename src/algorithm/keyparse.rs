//! Asymmetric key parsing with a fixed fallback order.
//!
//! Key files are accepted as PEM text or raw DER. Parsers are tried in order:
//! PKCS#8 private, PKCS#1 private, SEC1 EC private, PKIX public, PKCS#1
//! public. The first success wins; when all fail every attempt is reported.

use std::fmt::Display;

use k256::pkcs8::DecodePrivateKey as _;
use k256::pkcs8::DecodePublicKey as _;
use k256::pkcs8::EncodePublicKey as _;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::LineEnding;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{Error, Result};

pub enum ParsedKey {
    RsaPrivate(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
    EcPrivate(k256::SecretKey),
    EcPublic(k256::PublicKey),
}

impl ParsedKey {
    pub fn is_private(&self) -> bool {
        matches!(self, ParsedKey::RsaPrivate(_) | ParsedKey::EcPrivate(_))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ParsedKey::RsaPrivate(_) => "RSA private key",
            ParsedKey::RsaPublic(_) => "RSA public key",
            ParsedKey::EcPrivate(_) => "secp256k1 private key",
            ParsedKey::EcPublic(_) => "secp256k1 public key",
        }
    }

    /// The public half as a `PUBLIC KEY` PEM block.
    pub fn public_pem(&self) -> Result<String> {
        let pem = match self {
            ParsedKey::RsaPrivate(key) => key.to_public_key().to_public_key_pem(LineEnding::LF),
            ParsedKey::RsaPublic(key) => key.to_public_key_pem(LineEnding::LF),
            ParsedKey::EcPrivate(key) => key
                .public_key()
                .to_public_key_pem(k256::pkcs8::LineEnding::LF),
            ParsedKey::EcPublic(key) => key.to_public_key_pem(k256::pkcs8::LineEnding::LF),
        };
        pem.map_err(|e| Error::provisioning(format!("unable to encode public key: {e}")))
    }
}

fn attempt<T, E: Display>(
    attempts: &mut Vec<String>,
    label: &str,
    result: std::result::Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            attempts.push(format!("{label}: {e}"));
            None
        }
    }
}

/// Parses PEM or DER key bytes into whichever key type they hold.
pub fn parse(bytes: &[u8]) -> Result<ParsedKey> {
    let pem = std::str::from_utf8(bytes)
        .ok()
        .map(str::trim)
        .filter(|t| t.starts_with("-----BEGIN"));
    let mut attempts = Vec::new();

    let rsa_pkcs8 = match pem {
        Some(text) => RsaPrivateKey::from_pkcs8_pem(text),
        None => RsaPrivateKey::from_pkcs8_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKCS#8 private (RSA)", rsa_pkcs8) {
        return Ok(ParsedKey::RsaPrivate(key));
    }

    let ec_pkcs8 = match pem {
        Some(text) => k256::SecretKey::from_pkcs8_pem(text),
        None => k256::SecretKey::from_pkcs8_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKCS#8 private (secp256k1)", ec_pkcs8) {
        return Ok(ParsedKey::EcPrivate(key));
    }

    let rsa_pkcs1 = match pem {
        Some(text) => RsaPrivateKey::from_pkcs1_pem(text),
        None => RsaPrivateKey::from_pkcs1_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKCS#1 private", rsa_pkcs1) {
        return Ok(ParsedKey::RsaPrivate(key));
    }

    let ec_sec1 = match pem {
        Some(text) => k256::SecretKey::from_sec1_pem(text),
        None => k256::SecretKey::from_sec1_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "EC private", ec_sec1) {
        return Ok(ParsedKey::EcPrivate(key));
    }

    let rsa_pkix = match pem {
        Some(text) => RsaPublicKey::from_public_key_pem(text),
        None => RsaPublicKey::from_public_key_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKIX public (RSA)", rsa_pkix) {
        return Ok(ParsedKey::RsaPublic(key));
    }

    let ec_pkix = match pem {
        Some(text) => k256::PublicKey::from_public_key_pem(text),
        None => k256::PublicKey::from_public_key_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKIX public (secp256k1)", ec_pkix) {
        return Ok(ParsedKey::EcPublic(key));
    }

    let rsa_pkcs1_pub = match pem {
        Some(text) => RsaPublicKey::from_pkcs1_pem(text),
        None => RsaPublicKey::from_pkcs1_der(bytes),
    };
    if let Some(key) = attempt(&mut attempts, "PKCS#1 public", rsa_pkcs1_pub) {
        return Ok(ParsedKey::RsaPublic(key));
    }

    Err(Error::KeyParse { attempts })
}
