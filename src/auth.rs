use std::fmt;
use std::io::{self, BufRead, IsTerminal};

use zeroize::Zeroizing;

use crate::error::{Error, Result, Stage, StageExt};

/// How the password for a derived key is obtained.
#[derive(Clone)]
pub enum PasswordSource {
    /// Given on the command line or through `CRYPTOOL_PASSWORD`.
    Given(Zeroizing<String>),
    /// Prompt on a terminal, or read one line from piped stdin.
    Prompt,
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordSource::Given(_) => f.write_str("Given(***)"),
            PasswordSource::Prompt => f.write_str("Prompt"),
        }
    }
}

pub fn read_password(source: &PasswordSource) -> Result<Zeroizing<String>> {
    match source {
        PasswordSource::Given(pw) => Ok(pw.clone()),
        PasswordSource::Prompt => prompt().stage(Stage::Password),
    }
}

fn prompt() -> Result<Zeroizing<String>> {
    //  Interactive (TTY)
    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
        if pw.is_empty() {
            return Err(Error::provisioning("password cannot be empty"));
        }
        return Ok(pw);
    }

    //  stdin (Pipeline)
    //  echo "supersecret" | cryptool encrypt -p -i secret.txt
    read_password_line(&mut io::stdin().lock())
}

/// Reads one newline-terminated line. A stream that ends before the newline
/// is an error rather than an empty or partial password.
pub fn read_password_line<R: BufRead>(reader: &mut R) -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    reader.read_line(&mut buf)?;
    if !buf.ends_with('\n') {
        return Err(Error::provisioning(
            "stdin already ended, cannot read password",
        ));
    }
    trim_newline(&mut buf);
    if buf.is_empty() {
        return Err(Error::provisioning("password cannot be empty"));
    }
    Ok(buf)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_first_line_only() {
        let mut input = Cursor::new(b"hunter2\r\nrest of input".to_vec());
        assert_eq!(read_password_line(&mut input).unwrap().as_str(), "hunter2");

        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "rest of input");
    }

    #[test]
    fn eof_without_newline_is_fatal() {
        let mut input = Cursor::new(b"no newline".to_vec());
        assert!(read_password_line(&mut input).is_err());

        let mut empty = Cursor::new(Vec::new());
        assert!(read_password_line(&mut empty).is_err());
    }

    #[test]
    fn empty_line_is_rejected() {
        let mut input = Cursor::new(b"\n".to_vec());
        assert!(read_password_line(&mut input).is_err());
    }

    #[test]
    fn given_password_is_used_as_is() {
        let source = PasswordSource::Given(Zeroizing::new("pw".into()));
        assert_eq!(read_password(&source).unwrap().as_str(), "pw");
    }

    #[test]
    fn debug_output_hides_given_password() {
        let source = PasswordSource::Given(Zeroizing::new("hunter2".into()));
        let shown = format!("{source:?}");
        assert!(!shown.contains("hunter2"));
        assert_eq!(format!("{:?}", PasswordSource::Prompt), "Prompt");
    }
}
