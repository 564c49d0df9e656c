//! # Scoped Temporary Audio File
//!
//! Each request persists its upload to a uniquely-named scratch file before
//! the container is opened. The guard here ties the file's lifetime to the
//! request: when the guard drops - on success, on the format-gate rejection,
//! on a decode error, on an engine failure, on a timeout - the file is
//! removed. There is no code path that leaves the file behind, and no two
//! concurrent requests can ever share a path.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A WAV upload persisted to a unique temp path, deleted when dropped.
pub struct TempWav {
    file: NamedTempFile,
}

impl TempWav {
    /// Write the uploaded bytes to a fresh uniquely-named file.
    pub fn create(bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("audio-")
            .suffix(".wav")
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Path of the scratch file, for opening the container.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_file_holds_uploaded_bytes() {
        let temp = TempWav::create(b"RIFFdata").unwrap();
        let read_back = std::fs::read(temp.path()).unwrap();
        assert_eq!(read_back, b"RIFFdata");
    }

    #[test]
    fn test_concurrent_guards_get_distinct_paths() {
        let a = TempWav::create(b"a").unwrap();
        let b = TempWav::create(b"b").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_file_removed_on_drop() {
        let path: PathBuf;
        {
            let temp = TempWav::create(b"ephemeral").unwrap();
            path = temp.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_file_removed_when_dropped_by_early_return() {
        // Mirrors a handler bailing out mid-pipeline with `?`.
        fn rejects(bytes: &[u8]) -> Result<PathBuf, (PathBuf, String)> {
            let temp = TempWav::create(bytes).unwrap();
            let path = temp.path().to_path_buf();
            Err((path, "rejected by the format gate".to_string()))
        }

        let (path, _msg) = rejects(b"not really a wav").unwrap_err();
        assert!(!path.exists());
    }
}
