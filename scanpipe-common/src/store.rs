//! Request store: the shared directory layout
//!
//! The sole coordination channel between the serving process and the worker.
//! A request has no in-memory representation; it exists entirely as files
//! named `{id}{ext}` under the five store roots. State is derived from file
//! presence, never stored.

use crate::config::RequestsConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Derived request state, in the precedence order used to answer status
/// queries: the highest listed state wins if its marker exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Result document exists
    Done,
    /// Error marker exists
    Error,
    /// Only the uploaded image exists
    Pending,
    /// No file for this identifier
    Unknown,
}

/// The shared directory layout
#[derive(Debug, Clone)]
pub struct RequestStore {
    upload: PathBuf,
    result: PathBuf,
    logits: PathBuf,
    error: PathBuf,
    music: PathBuf,
}

impl RequestStore {
    pub fn new(config: &RequestsConfig) -> Self {
        Self {
            upload: config.upload_path.clone(),
            result: config.result_path.clone(),
            logits: config.logits_path.clone(),
            error: config.error_path.clone(),
            music: config.music_path.clone(),
        }
    }

    /// Create all store roots. Both processes call this at startup.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload, &self.result, &self.logits, &self.error, &self.music] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload
    }

    pub fn image_path(&self, id: &str) -> PathBuf {
        self.upload.join(format!("{id}.jpg"))
    }

    pub fn result_path(&self, id: &str) -> PathBuf {
        self.result.join(format!("{id}.xml"))
    }

    pub fn logits_path(&self, id: &str) -> PathBuf {
        self.logits.join(format!("{id}.logits"))
    }

    pub fn error_path(&self, id: &str) -> PathBuf {
        self.error.join(format!("{id}.txt"))
    }

    pub fn midi_path(&self, id: &str, line_id: Option<&str>) -> PathBuf {
        let file_name = match line_id {
            Some(line_id) => format!("{id}_{line_id}.mid"),
            None => format!("{id}.mid"),
        };
        self.music.join(file_name)
    }

    /// Derive the request state from file presence (done > error > pending >
    /// unknown). Identifiers that could escape the store directories map to
    /// Unknown without touching the filesystem.
    pub fn state(&self, id: &str) -> RequestState {
        if !valid_request_id(id) {
            return RequestState::Unknown;
        }
        if self.result_path(id).is_file() {
            RequestState::Done
        } else if self.error_path(id).is_file() {
            RequestState::Error
        } else if self.image_path(id).is_file() {
            RequestState::Pending
        } else {
            RequestState::Unknown
        }
    }

    /// Write the uploaded image bytes (unknown → pending transition).
    pub fn write_upload(&self, id: &str, bytes: &[u8]) -> Result<()> {
        check_id(id)?;
        std::fs::write(self.image_path(id), bytes)?;
        Ok(())
    }

    pub fn read_upload(&self, id: &str) -> Result<Vec<u8>> {
        check_id(id)?;
        std::fs::read(self.image_path(id)).map_err(Into::into)
    }

    /// Write the empty error marker (pending → error transition).
    pub fn write_error_marker(&self, id: &str) -> Result<()> {
        check_id(id)?;
        std::fs::write(self.error_path(id), b"")?;
        Ok(())
    }

    /// Persist the result document last and atomically: the file appears
    /// under its final name only via rename, so a request can never be
    /// observed `done` with a partially written document.
    pub fn write_result_atomic(&self, id: &str, xml: &str) -> Result<()> {
        check_id(id)?;
        let final_path = self.result_path(id);
        let tmp_path = self.result.join(format!(".{id}.xml.tmp"));
        std::fs::write(&tmp_path, xml)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn read_result(&self, id: &str) -> Result<String> {
        check_id(id)?;
        std::fs::read_to_string(self.result_path(id)).map_err(Into::into)
    }

    pub fn write_logits(&self, id: &str, bytes: &[u8]) -> Result<()> {
        check_id(id)?;
        std::fs::write(self.logits_path(id), bytes)?;
        Ok(())
    }

    pub fn read_logits(&self, id: &str) -> Result<Vec<u8>> {
        check_id(id)?;
        std::fs::read(self.logits_path(id)).map_err(Into::into)
    }

    /// Remove a partially written logits blob before writing the error
    /// marker, keeping the terminal state single-valued.
    pub fn remove_logits(&self, id: &str) {
        if !valid_request_id(id) {
            return;
        }
        let path = self.logits_path(id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(request_id = %id, error = %e, "could not remove partial logits");
            }
        }
    }

    pub fn write_midi(&self, id: &str, line_id: Option<&str>, bytes: &[u8]) -> Result<()> {
        check_id(id)?;
        if let Some(line_id) = line_id {
            if !valid_request_id(line_id) {
                return Err(Error::InvalidInput(format!("invalid line id: {line_id}")));
            }
        }
        std::fs::write(self.midi_path(id, line_id), bytes)?;
        Ok(())
    }

    pub fn read_midi(&self, id: &str, line_id: Option<&str>) -> Result<Vec<u8>> {
        check_id(id)?;
        if let Some(line_id) = line_id {
            if !valid_request_id(line_id) {
                return Err(Error::InvalidInput(format!("invalid line id: {line_id}")));
            }
        }
        std::fs::read(self.midi_path(id, line_id)).map_err(Into::into)
    }
}

/// Identifiers are uuid4 hex (and line ids hex with separators); anything
/// else — in particular path separators — is rejected.
pub fn valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_id(id: &str) -> Result<()> {
    if valid_request_id(id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid request id: {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, RequestStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = RequestsConfig {
            upload_path: dir.path().join("upload"),
            result_path: dir.path().join("result"),
            logits_path: dir.path().join("logits"),
            error_path: dir.path().join("error"),
            music_path: dir.path().join("music"),
        };
        let store = RequestStore::new(&config);
        store.ensure_dirs().unwrap();
        (dir, store)
    }

    #[test]
    fn unknown_until_uploaded() {
        let (_dir, store) = test_store();
        assert_eq!(store.state("deadbeef"), RequestState::Unknown);

        store.write_upload("deadbeef", b"jpeg bytes").unwrap();
        assert_eq!(store.state("deadbeef"), RequestState::Pending);
    }

    #[test]
    fn error_marker_is_terminal_over_pending() {
        let (_dir, store) = test_store();
        store.write_upload("r1", b"x").unwrap();
        store.write_error_marker("r1").unwrap();
        assert_eq!(store.state("r1"), RequestState::Error);
    }

    #[test]
    fn result_takes_precedence() {
        let (_dir, store) = test_store();
        store.write_upload("r1", b"x").unwrap();
        store.write_result_atomic("r1", "<Page/>").unwrap();
        assert_eq!(store.state("r1"), RequestState::Done);
        // idempotent reads
        assert_eq!(store.state("r1"), RequestState::Done);
    }

    #[test]
    fn traversal_ids_are_unknown() {
        let (_dir, store) = test_store();
        assert_eq!(store.state("../etc/passwd"), RequestState::Unknown);
        assert!(store.write_upload("../x", b"x").is_err());
    }

    #[test]
    fn remove_logits_tolerates_absence() {
        let (_dir, store) = test_store();
        store.remove_logits("never-written");

        store.write_logits("r2", b"{}").unwrap();
        store.remove_logits("r2");
        assert!(store.read_logits("r2").is_err());
    }

    #[test]
    fn midi_paths_follow_the_line_convention() {
        let (_dir, store) = test_store();
        assert!(store
            .midi_path("abc", None)
            .to_string_lossy()
            .ends_with("abc.mid"));
        assert!(store
            .midi_path("abc", Some("l7"))
            .to_string_lossy()
            .ends_with("abc_l7.mid"));
    }
}
