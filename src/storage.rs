//! Output sinks: atomic file creation and stdout.

use getrandom::fill;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, Stage, StageExt};

/// A file that is written exactly once, atomically, and never overwritten.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the file with `data`.
    ///
    /// Data goes to a randomly named temporary file in the same directory,
    /// is synced, then moved into place. A crash leaves either no file or the
    /// complete one. Fails if the target already exists.
    pub fn create(&self, data: &[u8]) -> Result<()> {
        let tmp_path = self.write_temp(data)?;
        self.place(&tmp_path)
    }

    /// Writes and syncs `data` to a fresh temporary file next to the target.
    fn write_temp(&self, data: &[u8]) -> Result<PathBuf> {
        if self.exists() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("'{}' already exists", self.path.display()),
            )
            .into());
        }
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        let written = tmp_file.write_all(data).and_then(|_| tmp_file.sync_all());
        drop(tmp_file);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(tmp_path)
    }

    /// Moves a temporary file written by `write_temp` to the target.
    fn place(&self, tmp_path: &Path) -> Result<()> {
        if let Err(e) = self.move_into_place(tmp_path) {
            let _ = fs::remove_file(tmp_path);
            return Err(e);
        }

        // fsync directory
        #[cfg(not(target_os = "windows"))]
        if let Some(parent) = self.parent() {
            File::open(parent)?.sync_all()?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf)
            .map_err(|e| Error::crypto(format!("OS random generator unavailable: {e}")))?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                Error::Config(format!("'{}' is not a file path", self.path.display()))
            })?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Moves the temporary file to the target without replacing an existing
    /// file, using `MoveFileExW` with `MOVEFILE_WRITE_THROUGH`.
    #[cfg(target_os = "windows")]
    fn move_into_place(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{MOVEFILE_WRITE_THROUGH, MoveFileExW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result =
            unsafe { MoveFileExW(tmp_w.as_ptr(), target_w.as_ptr(), MOVEFILE_WRITE_THROUGH) };

        if result == 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }

    /// Links the temporary file under the target name, which fails if the
    /// target appeared in the meantime, then drops the temporary name.
    #[cfg(not(target_os = "windows"))]
    fn move_into_place(&self, tmp_path: &Path) -> Result<()> {
        fs::hard_link(tmp_path, &self.path)?;
        fs::remove_file(tmp_path)?;
        Ok(())
    }
}

/// Where a finished output goes.
#[derive(Clone, Debug)]
pub enum Sink {
    Stdout,
    File(Storage),
}

impl Sink {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Sink::File(Storage::new(path)),
            None => Sink::Stdout,
        }
    }
}

/// An output held back until the whole operation has succeeded.
pub struct Pending {
    pub sink: Sink,
    pub data: Vec<u8>,
    pub stage: Stage,
}

// data may be plaintext or key material
impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("sink", &self.sink)
            .field("bytes", &self.data.len())
            .field("stage", &self.stage)
            .finish()
    }
}

impl Pending {
    pub fn new(sink: Sink, data: Vec<u8>, stage: Stage) -> Self {
        Self { sink, data, stage }
    }
}

/// Writes every pending output: files first, stdout last.
///
/// All files are written to temporary names before any is moved into
/// place. If one fails, the files already placed are removed again.
pub fn commit(pending: Vec<Pending>) -> Result<()> {
    let (stdout, files): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .partition(|p| matches!(p.sink, Sink::Stdout));

    let mut staged: Vec<(&Storage, PathBuf, Stage)> = Vec::with_capacity(files.len());
    for p in &files {
        if let Sink::File(storage) = &p.sink {
            tracing::debug!(
                path = %storage.path().display(),
                bytes = p.data.len(),
                "writing output"
            );
            match storage.write_temp(&p.data) {
                Ok(tmp) => staged.push((storage, tmp, p.stage)),
                Err(e) => {
                    for (_, tmp, _) in &staged {
                        let _ = fs::remove_file(tmp);
                    }
                    return Err(e).stage(p.stage);
                }
            }
        }
    }

    for (i, (storage, tmp, stage)) in staged.iter().enumerate() {
        if let Err(e) = storage.place(tmp) {
            for (placed, _, _) in &staged[..i] {
                tracing::debug!(path = %placed.path().display(), "removing partial output");
                let _ = fs::remove_file(placed.path());
            }
            for (_, rest, _) in &staged[i + 1..] {
                let _ = fs::remove_file(rest);
            }
            return Err(e).stage(*stage);
        }
    }

    let mut out = io::stdout().lock();
    for p in stdout {
        out.write_all(&p.data).stage(p.stage)?;
    }
    out.flush().stage(Stage::Output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // --------------------------------------------------
    // CREATE TESTS
    // --------------------------------------------------

    #[test]
    fn create_writes_data() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("out.bin"));
        storage.create(b"hello world").unwrap();

        assert_eq!(fs::read(storage.path()).unwrap(), b"hello world");
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"first").unwrap();

        let storage = Storage::new(path.clone());
        let err = storage.create(b"second").unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == ErrorKind::AlreadyExists));
        assert_eq!(fs::read(path).unwrap(), b"first");
    }

    // --------------------------------------------------
    // RANDOM TMP PATH TESTS
    // --------------------------------------------------

    #[test]
    fn random_tmp_path_has_same_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let storage = Storage::new(path.clone());

        let tmp = storage.random_tmp_path().unwrap();

        assert_eq!(tmp.parent(), path.parent());
        assert_ne!(tmp, path);
    }

    #[test]
    fn tmp_names_are_unique() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("out.bin"));

        let a = storage.random_tmp_path().unwrap();
        let b = storage.random_tmp_path().unwrap();

        assert_ne!(a, b);
    }

    // --------------------------------------------------
    // SAVE EDGE CASES
    // --------------------------------------------------

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("out.bin"));
        storage.create(&vec![42u8; 10_000]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "out.bin");
    }

    #[test]
    fn parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("out.bin");

        Storage::new(nested.clone()).create(b"data").unwrap();

        assert!(nested.exists());
    }

    #[test]
    fn commit_stops_at_first_existing_file() {
        let dir = tempdir().unwrap();
        let taken = dir.path().join("taken");
        fs::write(&taken, b"x").unwrap();

        let later = Sink::from_path(Some(dir.path().join("later")));
        let pending = vec![
            Pending::new(Sink::File(Storage::new(taken)), b"new".to_vec(), Stage::Output),
            Pending::new(later, b"y".to_vec(), Stage::Key),
        ];
        let err = commit(pending).unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Output]);
        assert!(!dir.path().join("later").exists());
    }

    #[test]
    fn commit_leaves_nothing_behind_when_a_later_file_fails() {
        let dir = tempdir().unwrap();
        let key = dir.path().join("key");
        let taken = dir.path().join("taken");
        fs::write(&taken, b"x").unwrap();

        let tag = Sink::from_path(Some(dir.path().join("tag")));
        let pending = vec![
            Pending::new(Sink::from_path(Some(key.clone())), b"k".to_vec(), Stage::Generate),
            Pending::new(tag, b"t".to_vec(), Stage::Tag),
            Pending::new(Sink::File(Storage::new(taken)), b"new".to_vec(), Stage::Output),
        ];
        let err = commit(pending).unwrap_err();
        assert_eq!(err.stages(), vec![Stage::Output]);

        let mut entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        entries.sort();
        assert_eq!(entries, ["taken"]);
        assert!(!key.exists());
    }

    #[test]
    fn commit_writes_every_file() {
        let dir = tempdir().unwrap();
        let sink = |name: &str| Sink::from_path(Some(dir.path().join(name)));
        let pending = vec![
            Pending::new(sink("a"), b"1".to_vec(), Stage::Tag),
            Pending::new(sink("b"), b"2".to_vec(), Stage::Output),
        ];
        commit(pending).unwrap();

        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"1");
        assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"2");
    }

    #[test]
    fn pending_debug_omits_data() {
        let p = Pending::new(Sink::Stdout, b"secret plaintext".to_vec(), Stage::Output);
        let shown = format!("{p:?}");
        assert!(!shown.contains("data"));
        assert!(shown.contains("bytes: 16"));
    }
}
