use std::fs::File;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{ArtifactKind, StageAction, SubsetSize};
use crate::error::PuzzleDbError;
use crate::fetch::ArchiveSource;
use crate::fs_util;
use crate::store::{ArtifactState, Workspace, persist_staged};

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Rerun every stage even when its artifact is already complete.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireResult {
    pub working_dir: String,
    pub items: Vec<ArtifactResult>,
}

impl AcquireResult {
    pub fn item(&self, kind: ArtifactKind) -> Option<&ArtifactResult> {
        self.items.iter().find(|item| item.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResult {
    pub kind: ArtifactKind,
    pub path: String,
    pub action: StageAction,
    pub size_bytes: Option<u64>,
    pub lines: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

#[derive(Clone)]
pub struct App<S: ArchiveSource> {
    source: S,
}

impl<S: ArchiveSource> App<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Runs the four stages against `config.working_dir`: ensure the
    /// directory, fetch the archive, decompress it, derive subsets. Each stage
    /// is skipped when its output is already complete; the first failure
    /// aborts the run.
    pub fn acquire(
        &self,
        config: &ResolvedConfig,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireResult, PuzzleDbError> {
        let workspace = Workspace::from_config(config);
        let started = Instant::now();

        workspace.ensure_root()?;
        tracing::debug!(dir = %workspace.root(), "working directory ready");

        let dataset_path = workspace.dataset_path();
        let dataset_state = self.stage_state(&workspace, &dataset_path, &options)?;

        let archive = self.fetch_stage(&workspace, config, dataset_state, &options, sink)?;
        let dataset = self.decompress_stage(&workspace, config, dataset_state, sink)?;

        let mut items = vec![archive, dataset];
        for size in &config.subset_sizes {
            items.push(self.subset_stage(&workspace, *size, &options, sink)?);
        }

        sink.event(ProgressEvent {
            message: format!("done; artifacts in {}", workspace.root()),
            elapsed: Some(started.elapsed()),
        });

        Ok(AcquireResult {
            working_dir: workspace.root().to_string(),
            items,
        })
    }

    fn stage_state(
        &self,
        workspace: &Workspace,
        artifact: &Utf8Path,
        options: &AcquireOptions,
    ) -> Result<ArtifactState, PuzzleDbError> {
        if options.force {
            return Ok(ArtifactState::Missing);
        }
        let state = workspace.artifact_state(artifact)?;
        match state {
            ArtifactState::Incomplete { expected, actual } => {
                tracing::warn!(
                    path = %artifact,
                    ?expected,
                    actual,
                    "artifact does not match its manifest, rebuilding"
                );
            }
            ArtifactState::Unrecorded { .. } => {
                // Adopt files from earlier runs so later runs can verify them.
                workspace.write_manifest(artifact, "adopted")?;
            }
            ArtifactState::Missing | ArtifactState::Complete { .. } => {}
        }
        Ok(state)
    }

    fn fetch_stage(
        &self,
        workspace: &Workspace,
        config: &ResolvedConfig,
        dataset_state: ArtifactState,
        options: &AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ArtifactResult, PuzzleDbError> {
        let path = workspace.archive_path();

        // The archive only feeds the dataset; a usable dataset ends this stage
        // whatever state the archive is in.
        if dataset_state.is_usable() {
            let (action, size_bytes) = match std::fs::metadata(path.as_std_path()) {
                Ok(meta) => {
                    emit(sink, format!("{path} already exists"));
                    (StageAction::Present, Some(meta.len()))
                }
                Err(_) => {
                    emit(sink, format!("{path} not needed, dataset already exists"));
                    (StageAction::NotNeeded, None)
                }
            };
            return Ok(ArtifactResult {
                kind: ArtifactKind::Archive,
                path: path.to_string(),
                action,
                size_bytes,
                lines: None,
            });
        }

        let state = self.stage_state(workspace, &path, options)?;
        if let ArtifactState::Complete { size_bytes } | ArtifactState::Unrecorded { size_bytes } =
            state
        {
            emit(sink, format!("{path} already exists"));
            return Ok(ArtifactResult {
                kind: ArtifactKind::Archive,
                path: path.to_string(),
                action: StageAction::Present,
                size_bytes: Some(size_bytes),
                lines: None,
            });
        }

        emit(sink, format!("downloading {} -> {path}", config.remote_url));
        let start = Instant::now();
        let mut staged = workspace.staging_file(&path)?;
        let bytes = self.source.download(&config.remote_url, staged.as_file_mut())?;
        persist_staged(staged, &path)?;
        workspace.write_manifest(&path, &config.remote_url)?;
        tracing::info!(
            bytes,
            latency_ms = start.elapsed().as_millis() as u64,
            "archive downloaded"
        );

        Ok(ArtifactResult {
            kind: ArtifactKind::Archive,
            path: path.to_string(),
            action: StageAction::Downloaded,
            size_bytes: Some(bytes),
            lines: None,
        })
    }

    fn decompress_stage(
        &self,
        workspace: &Workspace,
        config: &ResolvedConfig,
        dataset_state: ArtifactState,
        sink: &dyn ProgressSink,
    ) -> Result<ArtifactResult, PuzzleDbError> {
        let path = workspace.dataset_path();

        if let ArtifactState::Complete { size_bytes } | ArtifactState::Unrecorded { size_bytes } =
            dataset_state
        {
            emit(sink, format!("{path} already exists"));
            return Ok(ArtifactResult {
                kind: ArtifactKind::Dataset,
                path: path.to_string(),
                action: StageAction::Present,
                size_bytes: Some(size_bytes),
                lines: None,
            });
        }

        let archive = workspace.archive_path();
        emit(sink, format!("decompressing {archive} -> {path}"));
        let start = Instant::now();
        let mut staged = workspace.staging_file(&path)?;
        let bytes = {
            let mut writer = std::io::BufWriter::new(staged.as_file_mut());
            fs_util::decompress_archive(archive.as_std_path(), config.codec, &mut writer)?
        };
        persist_staged(staged, &path)?;
        workspace.write_manifest(&path, archive.as_str())?;
        tracing::info!(
            bytes,
            latency_ms = start.elapsed().as_millis() as u64,
            "archive decompressed"
        );

        Ok(ArtifactResult {
            kind: ArtifactKind::Dataset,
            path: path.to_string(),
            action: StageAction::Decompressed,
            size_bytes: Some(bytes),
            lines: None,
        })
    }

    fn subset_stage(
        &self,
        workspace: &Workspace,
        size: SubsetSize,
        options: &AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ArtifactResult, PuzzleDbError> {
        let path = workspace.subset_path(size);
        let kind = ArtifactKind::Subset(size);

        let state = self.stage_state(workspace, &path, options)?;
        if let ArtifactState::Complete { size_bytes } | ArtifactState::Unrecorded { size_bytes } =
            state
        {
            emit(sink, format!("{path} already exists"));
            return Ok(ArtifactResult {
                kind,
                path: path.to_string(),
                action: StageAction::Present,
                size_bytes: Some(size_bytes),
                lines: None,
            });
        }

        let dataset = workspace.dataset_path();
        emit(sink, format!("creating {path} with the first {size} lines"));
        let input = File::open(dataset.as_std_path())
            .map_err(|err| PuzzleDbError::Filesystem(format!("open {dataset}: {err}")))?;
        let mut staged = workspace.staging_file(&path)?;
        let lines = {
            let mut writer = std::io::BufWriter::new(staged.as_file_mut());
            fs_util::copy_line_prefix(input, size.get(), &mut writer)?
        };
        if lines < size.get() {
            tracing::debug!(requested = size.get(), lines, "dataset shorter than subset size");
        }
        persist_staged(staged, &path)?;
        let manifest = workspace.write_manifest(&path, dataset.as_str())?;

        Ok(ArtifactResult {
            kind,
            path: path.to_string(),
            action: StageAction::Derived,
            size_bytes: Some(manifest.size_bytes),
            lines: Some(lines),
        })
    }
}

/// Resolves the file a consumer should read: the full dataset, or the
/// subset of the given size.
pub fn locate(
    config: &ResolvedConfig,
    subset: Option<SubsetSize>,
) -> Result<Utf8PathBuf, PuzzleDbError> {
    let workspace = Workspace::from_config(config);
    let path = match subset {
        Some(size) => workspace.subset_path(size),
        None => workspace.dataset_path(),
    };
    if !path.as_std_path().is_file() {
        return Err(PuzzleDbError::DatasetNotFound {
            path: path.to_string(),
        });
    }
    Ok(path)
}
