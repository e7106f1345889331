//! Key provisioning: generate, load, or derive from a password.

use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, random_bytes};
use crate::error::{Error, Result, Stage, StageExt};

/// Default length of the salt appended to password-encrypted output.
pub const SALT_LEN: usize = 16;

/// scrypt cost parameters. Both sides of an exchange must use the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    log_n: u8,
    r: u32,
    p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // N = 65536
            log_n: 16,
            r: 16,
            p: 1,
        }
    }
}

impl KdfParams {
    pub fn new(log_n: u8, r: u32, p: u32) -> Result<Self> {
        let params = Self { log_n, r, p };
        params.validate()?;
        Ok(params)
    }

    pub fn log_n(&self) -> u8 {
        self.log_n
    }

    pub fn r(&self) -> u32 {
        self.r
    }

    pub fn p(&self) -> u32 {
        self.p
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_n == 0 || self.log_n >= 64 {
            return Err(Error::Config("scrypt log_n must be between 1 and 63".into()));
        }
        if self.r == 0 {
            return Err(Error::Config("scrypt r must be >= 1".into()));
        }
        if self.p == 0 {
            return Err(Error::Config("scrypt p must be >= 1".into()));
        }
        Ok(())
    }
}

pub fn generate_salt(len: usize) -> Result<Vec<u8>> {
    Ok(random_bytes(len)?.to_vec())
}

/// Derive `len` key bytes from a password with scrypt.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    kdf.validate()?;
    let params = scrypt::Params::new(kdf.log_n, kdf.r, kdf.p, len)
        .map_err(|e| Error::provisioning(format!("invalid scrypt parameters: {e}")))?;

    let mut key = Zeroizing::new(vec![0u8; len]);
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|e| Error::provisioning(format!("scrypt key derivation failed: {e}")))?;
    Ok(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Where an invocation's key comes from. Exactly one per invocation.
pub enum KeySource {
    /// Fresh random key material of the algorithm's required length.
    Generate,
    /// Key bytes already read and decoded by the caller.
    Load(Zeroizing<Vec<u8>>),
    /// scrypt over a password; symmetric algorithms only.
    Password {
        password: Zeroizing<String>,
        salt_len: usize,
        kdf: KdfParams,
    },
}

impl KeySource {
    pub fn salt_len(&self) -> Option<usize> {
        match self {
            KeySource::Password { salt_len, .. } => Some(*salt_len),
            _ => None,
        }
    }
}

/// Populates `alg` from `source`.
///
/// For password-derived keys the salt is generated on encryption and
/// returned so the caller can append it; on decryption the caller passes the
/// salt it recovered from the artifact.
pub fn provision(
    alg: &mut dyn Algorithm,
    source: &KeySource,
    direction: Direction,
    recovered_salt: Option<&[u8]>,
) -> Result<Option<Vec<u8>>> {
    match source {
        KeySource::Generate => {
            if direction == Direction::Decrypt {
                return Err(Error::provisioning("cannot generate a key for decryption"))
                    .stage(Stage::Generate);
            }
            tracing::debug!(algorithm = alg.name(), "generating key");
            alg.populate_key(None).stage(Stage::Generate)?;
            Ok(None)
        }
        KeySource::Load(bytes) => {
            alg.populate_key(Some(bytes.as_slice())).stage(Stage::Key)?;
            Ok(None)
        }
        KeySource::Password {
            password,
            salt_len,
            kdf,
        } => {
            if !alg.is_symmetric() {
                return Err(Error::provisioning(format!(
                    "password-derived keys require a symmetric algorithm, {} is asymmetric",
                    alg.name()
                )))
                .stage(Stage::Password);
            }
            let salt = match (direction, recovered_salt) {
                (Direction::Encrypt, _) => generate_salt(*salt_len)?,
                (Direction::Decrypt, Some(salt)) if salt.len() == *salt_len => salt.to_vec(),
                (Direction::Decrypt, _) => {
                    return Err(Error::provisioning(format!(
                        "a {salt_len}-byte salt is required to derive the decryption key"
                    )))
                    .stage(Stage::Password);
                }
            };
            tracing::debug!(
                log_n = kdf.log_n(),
                r = kdf.r(),
                p = kdf.p(),
                "deriving key from password"
            );
            let key = derive_key(password, &salt, *kdf, alg.key_length())
                .stage(Stage::Password)?;
            alg.populate_key(Some(key.as_slice())).stage(Stage::Password)?;
            Ok((direction == Direction::Encrypt).then_some(salt))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::algorithm::{self, KeyState};

    /// Cheap parameters so tests don't spend seconds in scrypt.
    pub(crate) fn fast_kdf() -> KdfParams {
        KdfParams::new(4, 8, 1).unwrap()
    }

    fn password(pw: &str) -> KeySource {
        KeySource::Password {
            password: Zeroizing::new(pw.to_string()),
            salt_len: SALT_LEN,
            kdf: fast_kdf(),
        }
    }

    #[test]
    fn default_params_match_documented_costs() {
        let kdf = KdfParams::default();
        assert_eq!((kdf.log_n(), kdf.r(), kdf.p()), (16, 16, 1));
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];
        let k1 = derive_key("password", &salt, fast_kdf(), 32).unwrap();
        let k2 = derive_key("password", &salt, fast_kdf(), 32).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; 16];
        let k1 = derive_key("pw", &salt, KdfParams::new(4, 8, 1).unwrap(), 32).unwrap();
        let k2 = derive_key("pw", &salt, KdfParams::new(5, 8, 1).unwrap(), 32).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(KdfParams::new(0, 0, 0).is_err());
        assert!(KdfParams::new(16, 16, 0).is_err());
    }

    #[test]
    fn derived_key_fits_algorithm() {
        let mut alg = algorithm::get("AES-128-GCM").unwrap();
        let salt = provision(alg.as_mut(), &password("pw"), Direction::Encrypt, None)
            .unwrap()
            .unwrap();
        assert_eq!(salt.len(), SALT_LEN);
        assert_eq!(alg.export_key().unwrap().len(), 16);
    }

    #[test]
    fn same_password_and_salt_give_same_key() {
        let mut enc = algorithm::get("ChaCha20-Poly1305").unwrap();
        let salt = provision(enc.as_mut(), &password("pw"), Direction::Encrypt, None)
            .unwrap()
            .unwrap();

        let mut dec = algorithm::get("ChaCha20-Poly1305").unwrap();
        let none = provision(
            dec.as_mut(),
            &password("pw"),
            Direction::Decrypt,
            Some(salt.as_slice()),
        )
        .unwrap();
        assert!(none.is_none());
        assert_eq!(enc.export_key().unwrap(), dec.export_key().unwrap());
    }

    #[test]
    fn generate_is_rejected_for_decryption() {
        let mut alg = algorithm::get("AES-256-GCM").unwrap();
        let err = provision(alg.as_mut(), &KeySource::Generate, Direction::Decrypt, None)
            .unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Generate]);
        assert_eq!(alg.key_state(), KeyState::Unset);
    }

    #[test]
    fn password_requires_symmetric_algorithm() {
        let mut alg = algorithm::get("ECIES-SECP256K1").unwrap();
        let err = provision(alg.as_mut(), &password("pw"), Direction::Encrypt, None).unwrap_err();
        assert!(matches!(err.root(), Error::KeyProvisioning(_)));
    }

    #[test]
    fn decrypt_with_password_needs_salt() {
        let mut alg = algorithm::get("AES-256-GCM").unwrap();
        assert!(provision(alg.as_mut(), &password("pw"), Direction::Decrypt, None).is_err());
        let salt = [1u8, 2];
        let short = Some(&salt[..]);
        assert!(provision(alg.as_mut(), &password("pw"), Direction::Decrypt, short).is_err());
    }

    #[test]
    fn load_tags_key_stage() {
        let mut alg = algorithm::get("AES-256-GCM").unwrap();
        let err = provision(
            alg.as_mut(),
            &KeySource::Load(Zeroizing::new(vec![0u8; 5])),
            Direction::Encrypt,
            None,
        )
        .unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Key]);
    }
}
