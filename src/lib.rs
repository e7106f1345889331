//! File-oriented encryption toolkit: loosely named algorithms, key
//! provisioning (generated, loaded or password-derived), an envelope format
//! for nonce/tag/AAD/salt and independent text encodings per field.

pub mod algorithm;
pub mod auth;
pub mod config;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod hash;
pub mod keys;
pub mod resolve;
pub mod storage;
pub mod stream;

pub use crate::algorithm::{Algorithm, Family};
pub use crate::config::{Command, Job, Options, validate};
pub use crate::error::{Error, Result, Stage};
pub use crate::keys::KdfParams;
pub use crate::storage::Storage;
