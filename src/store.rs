use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::config::ResolvedConfig;
use crate::domain::{ArtifactKind, Codec, SubsetSize};
use crate::error::PuzzleDbError;

/// Conventional layout of one working directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
    dataset_name: String,
    codec: Codec,
}

impl Workspace {
    pub fn new(root: impl Into<Utf8PathBuf>, dataset_name: impl Into<String>, codec: Codec) -> Self {
        Self {
            root: root.into(),
            dataset_name: dataset_name.into(),
            codec,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            config.working_dir.clone(),
            config.dataset_name.clone(),
            config.codec,
        )
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn archive_path(&self) -> Utf8PathBuf {
        self.root
            .join(format!("{}.csv.{}", self.dataset_name, self.codec.extension()))
    }

    pub fn dataset_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{}.csv", self.dataset_name))
    }

    pub fn subset_path(&self, size: SubsetSize) -> Utf8PathBuf {
        self.root.join(format!("{}_{size}.csv", self.dataset_name))
    }

    pub fn artifact_path(&self, kind: ArtifactKind) -> Utf8PathBuf {
        match kind {
            ArtifactKind::Archive => self.archive_path(),
            ArtifactKind::Dataset => self.dataset_path(),
            ArtifactKind::Subset(size) => self.subset_path(size),
        }
    }

    pub fn metadata_path(&self, artifact: &Utf8Path) -> Utf8PathBuf {
        let file_name = artifact.file_name().unwrap_or(artifact.as_str());
        self.root.join("metadata").join(format!("{file_name}.json"))
    }

    pub fn ensure_root(&self) -> Result<(), PuzzleDbError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| {
            PuzzleDbError::Filesystem(format!("create {}: {err}", self.root))
        })
    }

    /// Classifies an artifact by presence and, when recorded, by the size in
    /// its manifest.
    pub fn artifact_state(&self, artifact: &Utf8Path) -> Result<ArtifactState, PuzzleDbError> {
        let file_meta = match fs::metadata(artifact.as_std_path()) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ArtifactState::Missing);
            }
            Err(err) => {
                return Err(PuzzleDbError::Filesystem(format!("stat {artifact}: {err}")));
            }
        };
        let actual = file_meta.len();

        let manifest_path = self.metadata_path(artifact);
        if !manifest_path.as_std_path().exists() {
            return Ok(ArtifactState::Unrecorded { size_bytes: actual });
        }
        match self.read_manifest(artifact) {
            Ok(Some(manifest)) if manifest.size_bytes == actual => {
                Ok(ArtifactState::Complete { size_bytes: actual })
            }
            Ok(Some(manifest)) => Ok(ArtifactState::Incomplete {
                expected: Some(manifest.size_bytes),
                actual,
            }),
            Ok(None) => Ok(ArtifactState::Unrecorded { size_bytes: actual }),
            Err(err) => {
                // An unreadable manifest cannot vouch for the artifact.
                tracing::warn!(path = %manifest_path, error = %err, "ignoring unreadable manifest");
                Ok(ArtifactState::Incomplete {
                    expected: None,
                    actual,
                })
            }
        }
    }

    pub fn read_manifest(
        &self,
        artifact: &Utf8Path,
    ) -> Result<Option<ArtifactManifest>, PuzzleDbError> {
        let path = self.metadata_path(artifact);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PuzzleDbError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| PuzzleDbError::Filesystem(format!("parse {path}: {err}")))
    }

    pub fn write_manifest(
        &self,
        artifact: &Utf8Path,
        source: &str,
    ) -> Result<ArtifactManifest, PuzzleDbError> {
        let size_bytes = fs::metadata(artifact.as_std_path())
            .map_err(|err| PuzzleDbError::Filesystem(format!("stat {artifact}: {err}")))?
            .len();
        let manifest = ArtifactManifest {
            source: source.to_string(),
            size_bytes,
            created_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("puzzle-db/{}", env!("CARGO_PKG_VERSION")),
        };
        let content = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.metadata_path(artifact), &content)?;
        Ok(manifest)
    }

    /// Opens a temp file next to the final artifact so that `persist` is a
    /// same-filesystem rename.
    pub fn staging_file(&self, artifact: &Utf8Path) -> Result<NamedTempFile, PuzzleDbError> {
        let parent = artifact.parent().unwrap_or(self.root.as_path());
        Builder::new()
            .prefix(".puzzle-db-")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PuzzleDbError::Filesystem(format!("create temp in {parent}: {err}")))
    }
}

/// Sidecar record written after an artifact has been fully persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactManifest {
    pub source: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub tool: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Missing,
    /// Present without a manifest, e.g. placed by hand or by an older run.
    Unrecorded { size_bytes: u64 },
    Complete { size_bytes: u64 },
    /// Size disagrees with the manifest, or the manifest is unreadable.
    Incomplete { expected: Option<u64>, actual: u64 },
}

impl ArtifactState {
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            ArtifactState::Unrecorded { .. } | ArtifactState::Complete { .. }
        )
    }
}

/// Flushes the staged file and renames it onto `dest`.
pub fn persist_staged(staged: NamedTempFile, dest: &Utf8Path) -> Result<(), PuzzleDbError> {
    staged
        .as_file()
        .sync_all()
        .map_err(|err| PuzzleDbError::Filesystem(format!("flush {dest}: {err}")))?;
    staged
        .persist(dest.as_std_path())
        .map_err(|err| PuzzleDbError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PuzzleDbError> {
    let parent = path
        .parent()
        .ok_or_else(|| PuzzleDbError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PuzzleDbError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".puzzle-db-")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
    persist_staged(temp, path)
}
