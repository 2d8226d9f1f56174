//! Flat output directory where every confirmed-new resource lands as one file.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::types::{CaptureError, CaptureResult};

/// Destination for persisted resources.
pub trait ResourceStore: Send {
    /// Write `bytes` for the resource with the given sequence index and
    /// return where it landed.
    fn persist(&mut self, sequence_index: u64, extension: &str, bytes: &[u8])
        -> CaptureResult<PathBuf>;
}

/// Writes each resource to `<dir>/<seq>_<timestamp>.<ext>`.
///
/// The directory is created on the first write, not at construction.
pub struct DirectoryStore {
    dir: PathBuf,
    created: bool,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            created: false,
        }
    }

    fn ensure_dir(&mut self) -> CaptureResult<()> {
        if !self.created {
            std::fs::create_dir_all(&self.dir)?;
            self.created = true;
        }
        Ok(())
    }
}

/// Build the file name for one resource.
pub fn file_name(sequence_index: u64, created_at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{sequence_index:05}_{}.{extension}",
        created_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

impl ResourceStore for DirectoryStore {
    fn persist(
        &mut self,
        sequence_index: u64,
        extension: &str,
        bytes: &[u8],
    ) -> CaptureResult<PathBuf> {
        if extension.is_empty() || extension.contains(['/', '\\', '.']) {
            return Err(CaptureError::Storage(format!(
                "refusing unsafe extension {extension:?}"
            )));
        }
        self.ensure_dir()?;

        let path = self
            .dir
            .join(file_name(sequence_index, Utc::now(), extension));
        // create_new: a sequence index is never reused, so an existing file
        // means something else is writing into the directory.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(file_name(12, at, "png"), "00012_20260304T050607000Z.png");
    }

    #[test]
    fn test_directory_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("captured");
        let mut store = DirectoryStore::new(&out);
        assert!(!out.exists());

        let path = store.persist(1, "bin", &[1, 2, 3]).unwrap();
        assert!(out.is_dir());
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(path.extension().unwrap(), "bin");
    }

    #[test]
    fn test_rejects_path_like_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        assert!(store.persist(1, "../x", b"x").is_err());
        assert!(store.persist(2, "", b"x").is_err());
    }
}
