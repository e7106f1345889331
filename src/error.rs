//! Error types shared by every layer of the toolkit.

use std::fmt;

use thiserror::Error;

/// Short tag naming the pipeline stage an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Encrypt,
    Decrypt,
    Input,
    Output,
    Key,
    Generate,
    Password,
    Iv,
    Tag,
    Aad,
    Encode,
    Decode,
    Hash,
    PublicKey,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Stage::Encrypt => "ECY",
            Stage::Decrypt => "DCY",
            Stage::Input => "INP",
            Stage::Output => "OUT",
            Stage::Key => "KEY",
            Stage::Generate => "GEN",
            Stage::Password => "PWD",
            Stage::Iv => "IV",
            Stage::Tag => "TAG",
            Stage::Aad => "AAD",
            Stage::Encode => "ENCODE",
            Stage::Decode => "DECODE",
            Stage::Hash => "HASH",
            Stage::PublicKey => "PUBKEY",
        };
        f.write_str(tag)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing command line input.
    #[error("[CONF] {0}")]
    Config(String),

    /// One or more incompatible or unusable options, reported together.
    #[error("[VLDT]{}", report(.0))]
    Validation(Vec<String>),

    #[error("unsupported {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("'{name}' ambiguously matched to {kind}s {candidates:?}")]
    Ambiguous {
        kind: &'static str,
        name: String,
        candidates: Vec<String>,
    },

    #[error("{0}")]
    KeyProvisioning(String),

    /// Every key parser failed; each attempt is listed.
    #[error("unable to parse key material{}", report(.attempts))]
    KeyParse { attempts: Vec<String> },

    #[error("[{0}] key not ready")]
    KeyNotReady(&'static str),

    #[error("public key cannot be used for decryption")]
    PublicKeyCannotDecrypt,

    #[error("[{scheme}] {reason}")]
    Encoding { scheme: &'static str, reason: String },

    #[error("{0}")]
    Crypto(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("[{stage}]{}", prefixed(.inner))]
    Staged { stage: Stage, inner: Box<Error> },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    pub fn provisioning(msg: impl Into<String>) -> Self {
        Error::KeyProvisioning(msg.into())
    }

    pub fn encoding(scheme: &'static str, reason: impl fmt::Display) -> Self {
        Error::Encoding {
            scheme,
            reason: reason.to_string(),
        }
    }

    /// Strips stage tags down to the error that actually occurred.
    pub fn root(&self) -> &Error {
        match self {
            Error::Staged { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Stage tags from outermost to innermost.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        let mut current = self;
        while let Error::Staged { stage, inner } = current {
            stages.push(*stage);
            current = inner;
        }
        stages
    }
}

/// Adds `.stage(..)` to results so each layer can tag what it was processing.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<Error>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| Error::Staged {
            stage,
            inner: Box::new(e.into()),
        })
    }
}

fn report(items: &[String]) -> String {
    let mut buf = String::from("[");
    for item in items {
        buf.push_str("\n - ");
        buf.push_str(item);
    }
    buf.push_str("\n]");
    buf
}

// nested stage tags render back to back: "[ECY][KEY] ..."
fn prefixed(inner: &Error) -> String {
    match inner {
        Error::Staged { .. } => inner.to_string(),
        other => format!(" {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_render_as_prefix_chain() {
        let err: Result<()> = Err(Error::crypto("authentication failed"));
        let err = err.stage(Stage::Iv).stage(Stage::Decrypt).unwrap_err();

        assert_eq!(err.to_string(), "[DCY][IV] authentication failed");
        assert_eq!(err.stages(), vec![Stage::Decrypt, Stage::Iv]);
        assert!(matches!(err.root(), Error::Crypto(_)));
    }

    #[test]
    fn validation_report_lists_every_problem() {
        let err = Error::Validation(vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "[VLDT][\n - first\n - second\n]");
    }

    #[test]
    fn ambiguous_enumerates_candidates() {
        let err = Error::Ambiguous {
            kind: "algorithm",
            name: "rsa512".into(),
            candidates: vec!["RSA-2048-OAEP-SHA512".into(), "RSA-4096-OAEP-SHA512".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("RSA-2048-OAEP-SHA512"));
        assert!(msg.contains("RSA-4096-OAEP-SHA512"));
    }
}
