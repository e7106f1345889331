//! RSA with OAEP (SHA-256 / SHA-512) or PKCS#1 v1.5 padding.

use aes_gcm::aead::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use super::keyparse::{self, ParsedKey};
use super::{Algorithm, DecryptParams, EncryptParams, Family, KeyState, Sealed};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    OaepSha256,
    OaepSha512,
    Pkcs1v15,
}

struct Keypair {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

pub struct RsaAlgorithm {
    name: &'static str,
    bits: usize,
    padding: Padding,
    key: Option<Keypair>,
}

impl RsaAlgorithm {
    pub fn new(name: &'static str, bits: usize, padding: Padding) -> Self {
        Self {
            name,
            bits,
            padding,
            key: None,
        }
    }

    fn keypair(&self) -> Result<&Keypair> {
        self.key.as_ref().ok_or(Error::KeyNotReady(self.name))
    }

    fn check_size(&self, public: &RsaPublicKey) {
        let bits = public.size() * 8;
        if bits != self.bits {
            tracing::warn!(
                algorithm = self.name,
                expected = self.bits,
                actual = bits,
                "RSA key size differs from the algorithm's nominal size"
            );
        }
    }
}

fn reject_symmetric_params(name: &str, iv: bool, tag: bool, aad: bool) -> Result<()> {
    if iv || tag || aad {
        return Err(Error::crypto(format!("{name} does not take an IV, tag or AAD")));
    }
    Ok(())
}

impl Algorithm for RsaAlgorithm {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> Family {
        Family::Asymmetric
    }

    fn key_length(&self) -> usize {
        self.bits
    }

    fn key_state(&self) -> KeyState {
        match &self.key {
            None => KeyState::Unset,
            Some(Keypair { private: None, .. }) => KeyState::PublicOnly,
            Some(_) => KeyState::Populated,
        }
    }

    fn populate_key(&mut self, material: Option<&[u8]>) -> Result<()> {
        let keypair = match material {
            None => {
                tracing::debug!(bits = self.bits, "generating RSA key");
                let private = RsaPrivateKey::new(&mut OsRng, self.bits)
                    .map_err(|e| Error::provisioning(format!("RSA key generation failed: {e}")))?;
                Keypair {
                    public: private.to_public_key(),
                    private: Some(private),
                }
            }
            Some(bytes) => match keyparse::parse(bytes)? {
                ParsedKey::RsaPrivate(private) => Keypair {
                    public: private.to_public_key(),
                    private: Some(private),
                },
                ParsedKey::RsaPublic(public) => Keypair {
                    public,
                    private: None,
                },
                other => {
                    return Err(Error::provisioning(format!(
                        "{} requires an RSA key, got a {}",
                        self.name,
                        other.describe()
                    )));
                }
            },
        };
        self.check_size(&keypair.public);
        self.key = Some(keypair);
        Ok(())
    }

    fn export_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        let private = self
            .keypair()?
            .private
            .as_ref()
            .ok_or_else(|| Error::provisioning("only a public key is loaded"))?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::provisioning(format!("unable to encode private key: {e}")))?;
        Ok(Zeroizing::new(pem.as_bytes().to_vec()))
    }

    fn encrypt(&self, plaintext: &[u8], params: &EncryptParams<'_>) -> Result<Sealed> {
        reject_symmetric_params(self.name, params.iv.is_some(), false, params.aad.is_some())?;
        let public = &self.keypair()?.public;
        let mut rng = OsRng;
        let ciphertext = match self.padding {
            Padding::OaepSha256 => public.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext),
            Padding::OaepSha512 => public.encrypt(&mut rng, Oaep::new::<Sha512>(), plaintext),
            Padding::Pkcs1v15 => public.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext),
        }
        .map_err(|e| Error::crypto(format!("{} encryption failed: {e}", self.name)))?;
        Ok(Sealed::new(ciphertext, 0, 0))
    }

    fn decrypt(&self, input: &[u8], params: &DecryptParams<'_>) -> Result<Zeroizing<Vec<u8>>> {
        reject_symmetric_params(
            self.name,
            params.iv.is_some(),
            params.tag.is_some(),
            params.aad.is_some(),
        )?;
        let private = self
            .keypair()?
            .private
            .as_ref()
            .ok_or(Error::PublicKeyCannotDecrypt)?;
        let plaintext = match self.padding {
            Padding::OaepSha256 => private.decrypt(Oaep::new::<Sha256>(), input),
            Padding::OaepSha512 => private.decrypt(Oaep::new::<Sha512>(), input),
            Padding::Pkcs1v15 => private.decrypt(Pkcs1v15Encrypt, input),
        }
        .map_err(|_| Error::crypto("decryption failed"))?;
        Ok(Zeroizing::new(plaintext))
    }
}
