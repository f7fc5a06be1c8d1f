//! # Scratch File Handling
//!
//! Uploaded audio lives on disk only for the duration of one request. Each
//! upload gets its own uuid-named file inside the scratch directory so that
//! concurrent or repeated requests never collide, and the file is removed
//! when the guard goes out of scope: on success, on error, and on early
//! return alike. Deletion failure is logged and otherwise ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Create the scratch directory if it does not exist yet.
///
/// Called once at startup, before the server starts accepting uploads.
pub fn ensure_scratch_dir(dir: &str) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// A per-request scratch file, removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Write `bytes` to a fresh uniquely-named file under `dir`.
    ///
    /// The original extension is kept so the decoder can sniff the container
    /// format from the name as well as the content.
    pub fn create(dir: &str, extension: &str, bytes: &[u8]) -> io::Result<Self> {
        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), extension.to_lowercase())
        };
        let path = Path::new(dir).join(name);

        fs::write(&path, bytes)?;
        debug!(path = %path.display(), size = bytes.len(), "Scratch file written");

        Ok(Self { path })
    }

    /// Path of the scratch file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Scratch file cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> String {
        let dir = std::env::temp_dir().join(format!("scratch-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn test_scratch_file_written_and_removed() {
        let dir = temp_dir();
        let path;
        {
            let file = ScratchFile::create(&dir, "webm", b"payload").unwrap();
            path = file.path().to_path_buf();
            assert!(path.exists());
            assert_eq!(fs::read(&path).unwrap(), b"payload");
            assert_eq!(path.extension().unwrap(), "webm");
        }
        // Guard dropped, file gone
        assert!(!path.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_repeated_uploads_never_collide() {
        let dir = temp_dir();
        let a = ScratchFile::create(&dir, "wav", b"first").unwrap();
        let b = ScratchFile::create(&dir, "wav", b"second").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(fs::read(a.path()).unwrap(), b"first");
        assert_eq!(fs::read(b.path()).unwrap(), b"second");
        drop(a);
        drop(b);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_on_drop_is_ignored() {
        let dir = temp_dir();
        let file = ScratchFile::create(&dir, "ogg", b"payload").unwrap();
        fs::remove_file(file.path()).unwrap();
        // Drop must not panic even though the file is already gone
        drop(file);
        fs::remove_dir_all(&dir).unwrap();
    }
}
