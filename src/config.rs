//! Raw invocation settings and their validation into a runnable [`Job`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::algorithm::{self, Algorithm};
use crate::auth::PasswordSource;
use crate::encoding::{self, Encoding};
use crate::error::{Error, Result};
use crate::keys::{KdfParams, SALT_LEN};
use crate::stream::DEFAULT_BUFFER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Encrypt,
    Decrypt,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Encrypt => "encrypt",
            Command::Decrypt => "decrypt",
        })
    }
}

/// Settings as given by the caller, before any checking.
#[derive(Clone)]
pub struct Options {
    pub algorithm: Option<String>,
    pub key: Option<PathBuf>,
    pub generate: bool,
    pub password: Option<PasswordSource>,
    pub salt_len: usize,
    pub kdf: KdfParams,
    pub iv: Option<PathBuf>,
    pub tag: Option<PathBuf>,
    pub tag_out: Option<PathBuf>,
    pub aad: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Shared encoding: output and key on encryption, input and key on decryption.
    pub encoding: Option<String>,
    pub encode_in: Option<String>,
    pub encode_out: Option<String>,
    pub encode_key: Option<String>,
    pub encode_iv: Option<String>,
    pub encode_tag: Option<String>,
    pub encode_aad: Option<String>,
    pub buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            algorithm: None,
            key: None,
            generate: false,
            password: None,
            salt_len: SALT_LEN,
            kdf: KdfParams::default(),
            iv: None,
            tag: None,
            tag_out: None,
            aad: None,
            input: None,
            output: None,
            encoding: None,
            encode_in: None,
            encode_out: None,
            encode_key: None,
            encode_iv: None,
            encode_tag: None,
            encode_aad: None,
            buffer: DEFAULT_BUFFER,
        }
    }
}

/// Where the key of a validated job comes from.
#[derive(Clone, Debug)]
pub enum KeyPlan {
    /// Generate fresh material and write it to `path`.
    Generate { path: PathBuf },
    Load { path: PathBuf },
    Password {
        source: PasswordSource,
        salt_len: usize,
        kdf: KdfParams,
    },
}

/// Per-field text encodings; `None` means raw bytes.
#[derive(Clone, Copy, Default)]
pub struct Encodings {
    pub input: Option<&'static dyn Encoding>,
    pub output: Option<&'static dyn Encoding>,
    pub key: Option<&'static dyn Encoding>,
    pub iv: Option<&'static dyn Encoding>,
    pub tag: Option<&'static dyn Encoding>,
    pub aad: Option<&'static dyn Encoding>,
}

impl fmt::Debug for Encodings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encodings({self})")
    }
}

impl fmt::Display for Encodings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("in", self.input),
            ("out", self.output),
            ("key", self.key),
            ("iv", self.iv),
            ("tag", self.tag),
            ("aad", self.aad),
        ];
        let mut first = true;
        for (field, scheme) in fields {
            if let Some(scheme) = scheme {
                if !first {
                    f.write_str(",")?;
                }
                write!(f, "{field}={}", scheme.name())?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// A checked encrypt/decrypt invocation.
#[derive(Debug)]
pub struct Job {
    pub command: Command,
    pub algorithm: Box<dyn Algorithm>,
    pub key: KeyPlan,
    pub iv: Option<PathBuf>,
    pub tag: Option<PathBuf>,
    pub tag_out: Option<PathBuf>,
    pub aad: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub encodings: Encodings,
    pub buffer: usize,
}

fn resolve_encoding(raw: Option<&str>) -> Result<Option<&'static dyn Encoding>> {
    raw.map(encoding::resolve).transpose()
}

fn field_encoding(
    specific: &Option<String>,
    fallback: Option<&'static dyn Encoding>,
) -> Result<Option<&'static dyn Encoding>> {
    Ok(resolve_encoding(specific.as_deref())?.or(fallback))
}

fn resolve_encodings(opts: &Options, command: Command) -> Result<Encodings> {
    let shared = resolve_encoding(opts.encoding.as_deref())?;
    let (shared_in, shared_out) = match command {
        Command::Encrypt => (None, shared),
        Command::Decrypt => (shared, None),
    };
    Ok(Encodings {
        input: field_encoding(&opts.encode_in, shared_in)?,
        output: field_encoding(&opts.encode_out, shared_out)?,
        key: field_encoding(&opts.encode_key, shared)?,
        iv: field_encoding(&opts.encode_iv, None)?,
        tag: field_encoding(&opts.encode_tag, None)?,
        aad: field_encoding(&opts.encode_aad, None)?,
    })
}

fn must_exist(problems: &mut Vec<String>, what: &str, path: Option<&Path>) {
    if let Some(path) = path.filter(|p| !p.exists()) {
        problems.push(format!("{what} file '{}' does not exist", path.display()));
    }
}

fn must_not_exist(problems: &mut Vec<String>, what: &str, path: Option<&Path>) {
    if let Some(path) = path.filter(|p| p.exists()) {
        problems.push(format!(
            "{what} file '{}' already exists, refusing to overwrite",
            path.display()
        ));
    }
}

/// Resolves names and checks every option combination.
///
/// Name resolution fails fast. All other problems are collected and
/// returned together as one [`Error::Validation`] report.
pub fn validate(opts: Options, command: Command) -> Result<Job> {
    let requested = opts.algorithm.as_deref().unwrap_or(algorithm::DEFAULT);
    let algorithm = algorithm::resolve(requested)?;
    let encodings = resolve_encodings(&opts, command)?;

    let mut problems = Vec::new();
    let name = algorithm.name();
    let symmetric = algorithm.is_symmetric();
    let authenticated = algorithm.tag_length() > 0;
    let has_password = opts.password.is_some();

    must_exist(&mut problems, "input", opts.input.as_deref());
    must_not_exist(&mut problems, "output", opts.output.as_deref());

    // key source
    if opts.generate && has_password {
        problems.push("-g/--generate and -p/--password cannot be combined".into());
    }
    if opts.key.is_some() && has_password {
        problems.push("-k/--key and -p/--password cannot be combined".into());
    }
    if opts.key.is_none() && !opts.generate && !has_password {
        problems.push("a key is required: -k/--key, -g/--generate or -p/--password".into());
    }
    if opts.generate && opts.key.is_none() {
        problems.push("-g/--generate requires -k/--key to name the new key file".into());
    }
    if command == Command::Decrypt && opts.generate {
        problems.push("cannot generate a key for decryption".into());
    }
    if opts.generate {
        must_not_exist(&mut problems, "key", opts.key.as_deref());
    } else {
        must_exist(&mut problems, "key", opts.key.as_deref());
    }
    if has_password && opts.salt_len == 0 {
        problems.push("--salt must be greater than 0".into());
    }

    // envelope fields
    let symmetric_only = [
        ("--iv", opts.iv.is_some()),
        ("--aad", opts.aad.is_some()),
        ("--tag", opts.tag.is_some()),
        ("-p/--password", has_password),
    ];
    for (flag, _) in symmetric_only.iter().filter(|(_, set)| *set) {
        if !symmetric {
            problems.push(format!(
                "{flag} requires a symmetric algorithm, {name} is asymmetric"
            ));
        }
    }
    let tagged = [
        ("--aad", opts.aad.is_some() && symmetric),
        ("--tag", opts.tag.is_some() && symmetric),
        ("--tag-out", opts.tag_out.is_some()),
    ];
    for (flag, _) in tagged.iter().filter(|(_, set)| *set) {
        if !authenticated {
            problems.push(format!(
                "{flag} requires an authenticated algorithm, {name} has no tag"
            ));
        }
    }
    match command {
        Command::Encrypt if opts.tag.is_some() => {
            problems.push("--tag only applies to decryption, use --tag-out".into());
        }
        Command::Decrypt if opts.tag_out.is_some() => {
            problems.push("--tag-out only applies to encryption, use --tag".into());
        }
        _ => {}
    }
    must_exist(&mut problems, "IV", opts.iv.as_deref());
    must_exist(&mut problems, "tag", opts.tag.as_deref());
    must_exist(&mut problems, "AAD", opts.aad.as_deref());
    must_not_exist(&mut problems, "tag output", opts.tag_out.as_deref());

    if opts.buffer == 0 {
        problems.push("buffer size must be greater than 0".into());
    }

    if !problems.is_empty() {
        return Err(Error::Validation(problems));
    }

    let key = match (opts.password, opts.key) {
        (Some(source), _) => KeyPlan::Password {
            source,
            salt_len: opts.salt_len,
            kdf: opts.kdf,
        },
        (None, Some(path)) if opts.generate => KeyPlan::Generate { path },
        (None, Some(path)) => KeyPlan::Load { path },
        (None, None) => {
            return Err(Error::Config("no key source".into()));
        }
    };

    Ok(Job {
        command,
        algorithm,
        key,
        iv: opts.iv,
        tag: opts.tag,
        tag_out: opts.tag_out,
        aad: opts.aad,
        input: opts.input,
        output: opts.output,
        encodings,
        buffer: opts.buffer,
    })
}
