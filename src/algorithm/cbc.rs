//! AES-256 in CBC mode with PKCS#7 padding.
//!
//! This mode carries no authentication tag: a modified ciphertext may decrypt
//! to garbage or fail the padding check, but it is never detected as tampered
//! in general. It is offered for interoperability only; AAD and detached tags
//! are rejected.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use super::aead::split_envelope;
use super::{Algorithm, DecryptParams, EncryptParams, Family, KeyState, Sealed, random_bytes};
use crate::error::{Error, Result, Stage, StageExt};

const NAME: &str = "AES-256-CBC";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Default)]
pub struct Aes256Cbc {
    key: Option<Zeroizing<Vec<u8>>>,
}

impl Aes256Cbc {
    fn key(&self) -> Result<&[u8]> {
        self.key
            .as_deref()
            .map(Vec::as_slice)
            .ok_or(Error::KeyNotReady(NAME))
    }
}

impl Algorithm for Aes256Cbc {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> Family {
        Family::Symmetric
    }

    fn key_length(&self) -> usize {
        KEY_LEN
    }

    fn key_state(&self) -> KeyState {
        match self.key {
            Some(_) => KeyState::Populated,
            None => KeyState::Unset,
        }
    }

    fn nonce_length(&self) -> usize {
        IV_LEN
    }

    fn populate_key(&mut self, material: Option<&[u8]>) -> Result<()> {
        let key = match material {
            None => random_bytes(KEY_LEN)?,
            Some(bytes) if bytes.len() == KEY_LEN => Zeroizing::new(bytes.to_vec()),
            Some(bytes) => {
                return Err(Error::provisioning(format!(
                    "{NAME} requires a {KEY_LEN}-byte key, got {} bytes",
                    bytes.len()
                )));
            }
        };
        self.key = Some(key);
        Ok(())
    }

    fn export_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.key.clone().ok_or(Error::KeyNotReady(NAME))
    }

    fn encrypt(&self, plaintext: &[u8], params: &EncryptParams<'_>) -> Result<Sealed> {
        if params.aad.is_some() {
            return Err(Error::crypto(format!("{NAME} does not support AAD"))).stage(Stage::Aad);
        }
        let key = self.key()?;

        let generated;
        let iv: &[u8] = match params.iv {
            Some(iv) => iv,
            None => {
                generated = random_bytes(IV_LEN)?;
                &generated
            }
        };
        let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| Error::crypto(format!("expected {IV_LEN}-byte IV, got {}", iv.len())))
            .stage(Stage::Iv)?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        if params.iv.is_some() {
            return Ok(Sealed::new(ciphertext, 0, 0));
        }
        let mut bytes = Vec::with_capacity(IV_LEN + ciphertext.len());
        bytes.extend_from_slice(iv);
        bytes.extend_from_slice(&ciphertext);
        Ok(Sealed::new(bytes, IV_LEN, 0))
    }

    fn decrypt(&self, input: &[u8], params: &DecryptParams<'_>) -> Result<Zeroizing<Vec<u8>>> {
        if params.aad.is_some() {
            return Err(Error::crypto(format!("{NAME} does not support AAD"))).stage(Stage::Aad);
        }
        if params.tag.is_some() {
            return Err(Error::crypto(format!("{NAME} has no authentication tag")))
                .stage(Stage::Tag);
        }
        let key = self.key()?;
        let (iv, body) = split_envelope(input, IV_LEN, 0, params)?;

        let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| Error::crypto("invalid key or IV length"))?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&body)
            .map_err(|_| Error::crypto("malformed padding"))?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> Aes256Cbc {
        let mut alg = Aes256Cbc::default();
        alg.populate_key(None).unwrap();
        alg
    }

    #[test]
    fn pads_to_full_block() {
        let alg = keyed();
        for (len, body) in [(0usize, 16usize), (1, 16), (15, 16), (16, 32), (17, 32)] {
            let sealed = alg
                .encrypt(&vec![1u8; len], &EncryptParams::default())
                .unwrap();
            assert_eq!(sealed.nonce().len(), IV_LEN);
            assert_eq!(sealed.body().len(), body);
            assert!(sealed.tag().is_empty());

            let opened = alg
                .decrypt(sealed.as_bytes(), &DecryptParams::default())
                .unwrap();
            assert_eq!(*opened, vec![1u8; len]);
        }
    }

    #[test]
    fn external_iv_roundtrip() {
        let alg = keyed();
        let iv = [9u8; IV_LEN];
        let sealed = alg
            .encrypt(
                b"sixteen byte msg",
                &EncryptParams {
                    iv: Some(&iv),
                    aad: None,
                },
            )
            .unwrap();
        assert_eq!(sealed.as_bytes().len(), 32);

        let params = DecryptParams {
            iv: Some(&iv),
            ..Default::default()
        };
        assert_eq!(
            *alg.decrypt(sealed.as_bytes(), &params).unwrap(),
            b"sixteen byte msg"
        );
    }

    #[test]
    fn rejects_aad_and_tag() {
        let alg = keyed();
        let err = alg
            .encrypt(
                b"x",
                &EncryptParams {
                    iv: None,
                    aad: Some(b"aad"),
                },
            )
            .unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Aad]);

        let params = DecryptParams {
            tag: Some(b"tag"),
            ..Default::default()
        };
        assert_eq!(
            alg.decrypt(&[0u8; 32], &params).unwrap_err().stages(),
            vec![Stage::Tag]
        );
    }

    #[test]
    fn wrong_key_never_returns_original() {
        let alg = keyed();
        let sealed = alg
            .encrypt(b"some secret text", &EncryptParams::default())
            .unwrap();
        let other = keyed();
        if let Ok(plain) = other.decrypt(sealed.as_bytes(), &DecryptParams::default()) {
            assert_ne!(*plain, b"some secret text");
        }
    }
}
