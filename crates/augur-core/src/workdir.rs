//! Per-run working directory.
//!
//! The working directory is the unit of isolation for a pipeline run: a
//! freshly created, uniquely named filesystem area holding the uploaded
//! inputs, the intermediate metadata artifact, the execution log, and the
//! final result artifact. It is owned by exactly one run and never cleaned
//! up automatically; lifecycle management is left to the exterior.

use std::path::{Path, PathBuf};

use crate::error::{AugurError, Result};

/// Fixed file name of the intermediate metadata artifact.
pub const METADATA_FILE: &str = "metadata.txt";
/// Fixed file name of the final result artifact.
pub const RESULT_FILE: &str = "result.json";
/// Fixed file name of the append-only execution log.
pub const EXECUTION_LOG_FILE: &str = "execution_result.txt";

/// A pipeline run's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Creates `<uploads_root>/<run_id>` on disk and returns a handle to it.
    pub fn create(uploads_root: impl AsRef<Path>, run_id: &str) -> Result<Self> {
        let root = uploads_root.as_ref().join(run_id);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn result_path(&self) -> PathBuf {
        self.root.join(RESULT_FILE)
    }

    pub fn execution_log_path(&self) -> PathBuf {
        self.root.join(EXECUTION_LOG_FILE)
    }

    /// Creates an empty metadata artifact if none exists yet.
    ///
    /// This establishes a stable contract for what the execution step is
    /// expected to produce before any generated code runs.
    pub fn ensure_metadata_placeholder(&self) -> Result<()> {
        self.ensure_placeholder(&self.metadata_path())
    }

    /// Creates an empty result artifact if none exists yet.
    pub fn ensure_result_placeholder(&self) -> Result<()> {
        self.ensure_placeholder(&self.result_path())
    }

    fn ensure_placeholder(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        if !path.exists() {
            std::fs::write(path, "")?;
        }
        Ok(())
    }

    /// Reads the metadata artifact written by generated collection code.
    ///
    /// # Errors
    ///
    /// Returns [`AugurError::MissingMetadata`] if the artifact is absent.
    pub fn read_metadata(&self) -> Result<String> {
        let path = self.metadata_path();
        if !path.exists() {
            return Err(AugurError::missing_metadata(path.display().to_string()));
        }
        Ok(std::fs::read_to_string(&path)?)
    }

    /// Reads and parses the final result artifact.
    ///
    /// # Errors
    ///
    /// Returns [`AugurError::MissingArtifact`] if the file is absent or
    /// empty, [`AugurError::MalformedArtifact`] if it is not valid JSON.
    pub fn read_result_artifact(&self) -> Result<serde_json::Value> {
        let path = self.result_path();
        let display = path.display().to_string();

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AugurError::missing_artifact(display));
            }
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Err(AugurError::missing_artifact(display));
        }

        serde_json::from_str(&contents).map_err(|e| AugurError::MalformedArtifact {
            path: display,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_makes_unique_subdirectory() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        assert!(workdir.path().is_dir());
        assert!(workdir.path().ends_with("run-1"));
    }

    #[test]
    fn test_metadata_placeholder_is_created_once() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        workdir.ensure_metadata_placeholder().unwrap();
        std::fs::write(workdir.metadata_path(), "existing").unwrap();
        workdir.ensure_metadata_placeholder().unwrap();

        assert_eq!(workdir.read_metadata().unwrap(), "existing");
    }

    #[test]
    fn test_read_metadata_missing() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        let err = workdir.read_metadata().unwrap_err();
        assert!(matches!(err, AugurError::MissingMetadata { .. }));
    }

    #[test]
    fn test_read_result_artifact_missing_and_empty() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        assert!(matches!(
            workdir.read_result_artifact().unwrap_err(),
            AugurError::MissingArtifact { .. }
        ));

        std::fs::write(workdir.result_path(), "  ").unwrap();
        assert!(matches!(
            workdir.read_result_artifact().unwrap_err(),
            AugurError::MissingArtifact { .. }
        ));
    }

    #[test]
    fn test_read_result_artifact_malformed() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        std::fs::write(workdir.result_path(), "{not json").unwrap();
        assert!(matches!(
            workdir.read_result_artifact().unwrap_err(),
            AugurError::MalformedArtifact { .. }
        ));
    }

    #[test]
    fn test_read_result_artifact_parses_json() {
        let uploads = TempDir::new().unwrap();
        let workdir = WorkingDirectory::create(uploads.path(), "run-1").unwrap();

        std::fs::write(workdir.result_path(), r#"{"answer": 4.5}"#).unwrap();
        let value = workdir.read_result_artifact().unwrap();
        assert_eq!(value["answer"], 4.5);
    }
}
