//! AEAD ciphers: AES-GCM at three key sizes and ChaCha20-Poly1305.
//!
//! All of them share one envelope shape, `[nonce][ciphertext][tag]`, so a
//! single generic type covers the whole family. The nonce is generated per
//! encryption unless the caller supplies one, in which case it is left out of
//! the output.

use std::borrow::Cow;
use std::marker::PhantomData;

use aes::Aes192;
use aes_gcm::AesGcm;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, Payload};
use zeroize::Zeroizing;

use super::{Algorithm, DecryptParams, EncryptParams, Family, KeyState, Sealed, random_bytes};
use crate::error::{Error, Result, Stage, StageExt};

pub type Aes128Gcm = AeadAlgorithm<aes_gcm::Aes128Gcm>;
pub type Aes192Gcm = AeadAlgorithm<AesGcm<Aes192, U12>>;
pub type Aes256Gcm = AeadAlgorithm<aes_gcm::Aes256Gcm>;
pub type ChaCha20Poly1305 = AeadAlgorithm<chacha20poly1305::ChaCha20Poly1305>;

pub struct AeadAlgorithm<C> {
    name: &'static str,
    key: Option<Zeroizing<Vec<u8>>>,
    cipher: PhantomData<C>,
}

impl<C> AeadAlgorithm<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            key: None,
            cipher: PhantomData,
        }
    }
}

impl<C: Aead + KeyInit> AeadAlgorithm<C> {
    fn cipher(&self) -> Result<C> {
        let key = self.key.as_ref().ok_or(Error::KeyNotReady(self.name))?;
        C::new_from_slice(key).map_err(|_| {
            Error::provisioning(format!(
                "{} requires a {}-byte key",
                self.name,
                C::key_size()
            ))
        })
    }
}

/// Separates `[nonce][ciphertext][tag]` into the nonce and the
/// ciphertext-with-tag expected by the cipher, honouring an external IV or
/// detached tag.
pub(crate) fn split_envelope<'a>(
    input: &'a [u8],
    nonce_len: usize,
    tag_len: usize,
    params: &DecryptParams<'a>,
) -> Result<(&'a [u8], Cow<'a, [u8]>)> {
    let (nonce, rest) = match params.iv {
        Some(iv) => {
            if iv.len() != nonce_len {
                return Err(Error::crypto(format!(
                    "expected {nonce_len}-byte IV, got {}",
                    iv.len()
                )))
                .stage(Stage::Iv);
            }
            (iv, input)
        }
        None => {
            if input.len() < nonce_len {
                return Err(Error::crypto("ciphertext too short to hold a nonce"));
            }
            input.split_at(nonce_len)
        }
    };

    let body = match params.tag {
        Some(tag) => {
            if tag.len() != tag_len {
                return Err(Error::crypto(format!(
                    "expected {tag_len}-byte tag, got {}",
                    tag.len()
                )))
                .stage(Stage::Tag);
            }
            let mut joined = Vec::with_capacity(rest.len() + tag.len());
            joined.extend_from_slice(rest);
            joined.extend_from_slice(tag);
            Cow::Owned(joined)
        }
        None => {
            if rest.len() < tag_len {
                return Err(Error::crypto("ciphertext too short to hold a tag"));
            }
            Cow::Borrowed(rest)
        }
    };

    Ok((nonce, body))
}

impl<C: Aead + KeyInit> Algorithm for AeadAlgorithm<C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> Family {
        Family::Symmetric
    }

    fn key_length(&self) -> usize {
        C::key_size()
    }

    fn key_state(&self) -> KeyState {
        match self.key {
            Some(_) => KeyState::Populated,
            None => KeyState::Unset,
        }
    }

    fn nonce_length(&self) -> usize {
        <C as AeadCore>::NonceSize::USIZE
    }

    fn tag_length(&self) -> usize {
        <C as AeadCore>::TagSize::USIZE
    }

    fn populate_key(&mut self, material: Option<&[u8]>) -> Result<()> {
        let key = match material {
            None => random_bytes(self.key_length())?,
            Some(bytes) if bytes.len() == self.key_length() => Zeroizing::new(bytes.to_vec()),
            Some(bytes) => {
                return Err(Error::provisioning(format!(
                    "{} requires a {}-byte key, got {} bytes",
                    self.name,
                    self.key_length(),
                    bytes.len()
                )));
            }
        };
        self.key = Some(key);
        Ok(())
    }

    fn export_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.key.clone().ok_or(Error::KeyNotReady(self.name))
    }

    fn encrypt(&self, plaintext: &[u8], params: &EncryptParams<'_>) -> Result<Sealed> {
        let cipher = self.cipher()?;
        let nonce_len = self.nonce_length();

        let generated;
        let nonce: &[u8] = match params.iv {
            Some(iv) if iv.len() == nonce_len => iv,
            Some(iv) => {
                return Err(Error::crypto(format!(
                    "expected {nonce_len}-byte IV, got {}",
                    iv.len()
                )))
                .stage(Stage::Iv);
            }
            None => {
                generated = random_bytes(nonce_len)?;
                &generated
            }
        };

        let payload = Payload {
            msg: plaintext,
            aad: params.aad.unwrap_or_default(),
        };
        let ciphertext = cipher
            .encrypt(Nonce::<C>::from_slice(nonce), payload)
            .map_err(|_| Error::crypto("encryption failed"))?;

        if params.iv.is_some() {
            return Ok(Sealed::new(ciphertext, 0, self.tag_length()));
        }
        let mut bytes = Vec::with_capacity(nonce_len + ciphertext.len());
        bytes.extend_from_slice(nonce);
        bytes.extend_from_slice(&ciphertext);
        Ok(Sealed::new(bytes, nonce_len, self.tag_length()))
    }

    fn decrypt(&self, input: &[u8], params: &DecryptParams<'_>) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = self.cipher()?;
        let (nonce, body) = split_envelope(input, self.nonce_length(), self.tag_length(), params)?;

        let payload = Payload {
            msg: &body,
            aad: params.aad.unwrap_or_default(),
        };
        let plaintext = cipher
            .decrypt(Nonce::<C>::from_slice(nonce), payload)
            .map_err(|_| Error::crypto("authentication failed"))?;
        Ok(Zeroizing::new(plaintext))
    }
}
