//! The encrypt/decrypt pipeline.
//!
//! Artifact layout: `[nonce?][ciphertext][tag?][salt?]`, optionally text
//! encoded as a whole. The salt is present only for password-derived keys
//! and is always the last `salt_len` bytes.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

use crate::algorithm::{DecryptParams, EncryptParams};
use crate::auth;
use crate::config::{Command, Job, KeyPlan};
use crate::encoding::{self, Encoding};
use crate::error::{Error, Result, Stage, StageExt};
use crate::keys::{self, Direction, KeySource};
use crate::storage::{Pending, Sink, Storage};
use crate::stream::{self, Input};

/// Appends the salt to a finished artifact.
pub fn pack_salt(artifact: &mut Vec<u8>, salt: &[u8]) {
    artifact.extend_from_slice(salt);
}

/// Removes and returns the trailing `salt_len` bytes.
pub fn split_salt(artifact: &mut Vec<u8>, salt_len: usize) -> Result<Vec<u8>> {
    if artifact.len() < salt_len {
        return Err(Error::provisioning(format!(
            "input is {} bytes, too short to carry a {salt_len}-byte salt",
            artifact.len()
        )));
    }
    Ok(artifact.split_off(artifact.len() - salt_len))
}

/// Runs the job and returns its outputs without writing anything.
pub fn run(job: Job) -> Result<Vec<Pending>> {
    match job.command {
        Command::Encrypt => encrypt(job).stage(Stage::Encrypt),
        Command::Decrypt => decrypt(job).stage(Stage::Decrypt),
    }
}

fn read_field(
    path: Option<&Path>,
    scheme: Option<&dyn Encoding>,
    stage: Stage,
) -> Result<Option<Vec<u8>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = fs::read(path).stage(stage)?;
    match scheme {
        Some(scheme) => encoding::decode_text(scheme, &raw).stage(stage).map(Some),
        None => Ok(Some(raw)),
    }
}

fn encode_output(data: Vec<u8>, scheme: Option<&dyn Encoding>) -> Vec<u8> {
    match scheme {
        Some(scheme) => scheme.encode(&data).into_bytes(),
        None => data,
    }
}

fn key_source(job: &Job) -> Result<KeySource> {
    match &job.key {
        KeyPlan::Generate { .. } => Ok(KeySource::Generate),
        KeyPlan::Load { path } => {
            // asymmetric keys are PEM or DER and never text encoded
            let scheme = job.encodings.key.filter(|_| job.algorithm.is_symmetric());
            let bytes = read_field(Some(path), scheme, Stage::Key)?.unwrap_or_default();
            Ok(KeySource::Load(Zeroizing::new(bytes)))
        }
        KeyPlan::Password {
            source,
            salt_len,
            kdf,
        } => Ok(KeySource::Password {
            password: auth::read_password(source)?,
            salt_len: *salt_len,
            kdf: *kdf,
        }),
    }
}

fn read_input(job: &Job) -> Result<Vec<u8>> {
    let mut input = Input::open(job.input.as_deref()).stage(Stage::Input)?;
    stream::read_all(&mut input, job.buffer, job.encodings.input).stage(Stage::Input)
}

fn encrypt(mut job: Job) -> Result<Vec<Pending>> {
    let source = key_source(&job)?;
    let salt = keys::provision(job.algorithm.as_mut(), &source, Direction::Encrypt, None)?;

    let iv = read_field(job.iv.as_deref(), job.encodings.iv, Stage::Iv)?;
    let aad = read_field(job.aad.as_deref(), job.encodings.aad, Stage::Aad)?;
    let plaintext = Zeroizing::new(read_input(&job)?);

    tracing::debug!(
        algorithm = job.algorithm.name(),
        bytes = plaintext.len(),
        external_iv = iv.is_some(),
        "encrypting"
    );
    let params = EncryptParams {
        iv: iv.as_deref(),
        aad: aad.as_deref(),
    };
    let sealed = job.algorithm.encrypt(&plaintext, &params)?;

    let mut pending = Vec::new();
    if let KeyPlan::Generate { path } = &job.key {
        let exported = job.algorithm.export_key().stage(Stage::Generate)?;
        let scheme = job.encodings.key.filter(|_| job.algorithm.is_symmetric());
        let data = match scheme {
            Some(scheme) => scheme.encode(&exported).into_bytes(),
            None => exported.to_vec(),
        };
        pending.push(Pending::new(
            Sink::File(Storage::new(path.clone())),
            data,
            Stage::Generate,
        ));
    }

    let mut artifact = match job.tag_out.take() {
        Some(path) => {
            let (body, tag) = sealed.detach_tag();
            pending.push(Pending::new(
                Sink::File(Storage::new(path)),
                encode_output(tag, job.encodings.tag),
                Stage::Tag,
            ));
            body
        }
        None => sealed.into_bytes(),
    };
    if let Some(salt) = salt {
        pack_salt(&mut artifact, &salt);
    }
    pending.push(Pending::new(
        Sink::from_path(job.output.take()),
        encode_output(artifact, job.encodings.output),
        Stage::Output,
    ));
    Ok(pending)
}

fn decrypt(mut job: Job) -> Result<Vec<Pending>> {
    let source = key_source(&job)?;
    let mut artifact = read_input(&job)?;

    let salt = match source.salt_len() {
        Some(len) => Some(split_salt(&mut artifact, len).stage(Stage::Password)?),
        None => None,
    };
    keys::provision(
        job.algorithm.as_mut(),
        &source,
        Direction::Decrypt,
        salt.as_deref(),
    )?;

    let iv = read_field(job.iv.as_deref(), job.encodings.iv, Stage::Iv)?;
    let tag = read_field(job.tag.as_deref(), job.encodings.tag, Stage::Tag)?;
    let aad = read_field(job.aad.as_deref(), job.encodings.aad, Stage::Aad)?;

    tracing::debug!(
        algorithm = job.algorithm.name(),
        bytes = artifact.len(),
        external_iv = iv.is_some(),
        detached_tag = tag.is_some(),
        "decrypting"
    );
    let params = DecryptParams {
        iv: iv.as_deref(),
        tag: tag.as_deref(),
        aad: aad.as_deref(),
    };
    let plaintext = job.algorithm.decrypt(&artifact, &params)?;

    Ok(vec![Pending::new(
        Sink::from_path(job.output.take()),
        encode_output(plaintext.to_vec(), job.encodings.output),
        Stage::Output,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordSource;
    use crate::config::{self, Options};
    use crate::keys::tests::fast_kdf;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn output_of(pending: &[Pending]) -> &[u8] {
        pending
            .iter()
            .find(|p| p.stage == Stage::Output)
            .map(|p| p.data.as_slice())
            .unwrap()
    }

    fn write(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn with_password(pw: &str, input: PathBuf) -> Options {
        Options {
            password: Some(PasswordSource::Given(Zeroizing::new(pw.into()))),
            kdf: fast_kdf(),
            input: Some(input),
            ..Options::default()
        }
    }

    fn encrypt_with(opts: Options) -> Vec<u8> {
        let job = config::validate(opts, Command::Encrypt).unwrap();
        output_of(&run(job).unwrap()).to_vec()
    }

    fn decrypt_with(opts: Options) -> Result<Vec<u8>> {
        let job = config::validate(opts, Command::Decrypt).unwrap();
        run(job).map(|p| output_of(&p).to_vec())
    }

    #[test]
    fn salt_is_recovered_by_length() {
        let mut artifact = vec![1, 2, 3];
        pack_salt(&mut artifact, &[0xAA; 4]);
        let salt = split_salt(&mut artifact, 4).unwrap();
        assert_eq!(salt, [0xAA; 4]);
        assert_eq!(artifact, [1, 2, 3]);

        assert!(split_salt(&mut vec![1, 2], 4).is_err());
    }

    #[test]
    fn password_roundtrip() {
        let dir = tempdir().unwrap();
        let plain = write(&dir, "plain", b"attack at dawn");

        let sealed = encrypt_with(with_password("pw", plain));
        // nonce + body + tag + salt
        assert_eq!(sealed.len(), 12 + 14 + 16 + 16);

        let artifact = write(&dir, "sealed", &sealed);
        let opened = decrypt_with(with_password("pw", artifact)).unwrap();
        assert_eq!(opened, b"attack at dawn");
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let dir = tempdir().unwrap();
        let plain = write(&dir, "plain", b"secret");
        let artifact = write(&dir, "sealed", &encrypt_with(with_password("pw", plain)));

        let err = decrypt_with(with_password("not-pw", artifact)).unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Decrypt]);
        assert!(matches!(err.root(), Error::Crypto(_)));
    }

    #[test]
    fn detached_tag_and_external_iv_with_encodings() {
        let dir = tempdir().unwrap();
        let plain = write(&dir, "plain", b"fields travel separately");
        let iv = write(&dir, "iv", format!("{}\n", hex::encode([7u8; 12])).as_bytes());
        let aad = write(&dir, "aad", b"header");

        let fields = |input: PathBuf| Options {
            algorithm: Some("aes256gcm".into()),
            iv: Some(iv.clone()),
            aad: Some(aad.clone()),
            encode_iv: Some("hex".into()),
            encode_tag: Some("base64".into()),
            encoding: Some("rawbase64url".into()),
            ..with_password("pw", input)
        };

        let opts = Options {
            tag_out: Some(dir.path().join("tag.out")),
            ..fields(plain)
        };
        let job = config::validate(opts, Command::Encrypt).unwrap();
        let pending = run(job).unwrap();
        assert_eq!(pending.len(), 2);

        let sealed = output_of(&pending).to_vec();
        // no embedded nonce, no tag: body + salt
        let raw = encoding::decode_text(&crate::encoding::RawBase64Url, &sealed).unwrap();
        assert_eq!(raw.len(), 24 + 16);

        let tag_text = &pending.iter().find(|p| p.stage == Stage::Tag).unwrap().data;
        let opts = Options {
            tag: Some(write(&dir, "tag", tag_text)),
            ..fields(write(&dir, "sealed", &sealed))
        };
        assert_eq!(decrypt_with(opts).unwrap(), b"fields travel separately");
    }

    #[test]
    fn generated_symmetric_key_decrypts() {
        let dir = tempdir().unwrap();
        let plain = write(&dir, "plain", b"generated");
        let key = dir.path().join("key");

        let opts = Options {
            generate: true,
            key: Some(key.clone()),
            encoding: Some("hex".into()),
            input: Some(plain),
            ..Options::default()
        };
        let job = config::validate(opts, Command::Encrypt).unwrap();
        let pending = run(job).unwrap();
        let sealed = output_of(&pending).to_vec();
        let key_text = &pending.iter().find(|p| p.stage == Stage::Generate).unwrap().data;
        assert_eq!(key_text.len(), 64);

        fs::write(&key, key_text).unwrap();
        let artifact = write(&dir, "sealed", &sealed);
        let opts = Options {
            key: Some(key),
            encoding: Some("hex".into()),
            input: Some(artifact),
            ..Options::default()
        };
        assert_eq!(decrypt_with(opts).unwrap(), b"generated");
    }

    #[test]
    fn bad_key_file_is_tagged() {
        let dir = tempdir().unwrap();
        let plain = write(&dir, "plain", b"x");
        let key = write(&dir, "key", b"not hex!");
        let opts = Options {
            key: Some(key),
            encode_key: Some("hex".into()),
            input: Some(plain),
            ..Options::default()
        };
        let job = config::validate(opts, Command::Encrypt).unwrap();
        let err = run(job).unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Encrypt, Stage::Key]);
        assert!(matches!(err.root(), Error::Encoding { .. }));
    }
}
