use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PuzzleDbError {
    #[error("invalid subset size: {0} (expected a positive integer)")]
    InvalidSubsetSize(String),

    #[error("invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("invalid codec: {0} (expected zstd or gzip)")]
    InvalidCodec(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("archive request failed: {0}")]
    Network(String),

    #[error("archive server returned status {status}: {message}")]
    NetworkStatus { status: u16, message: String },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("dataset not found locally: {path}")]
    #[diagnostic(help("run `puzzle-db fetch` to download the puzzle database"))]
    DatasetNotFound { path: String },
}

impl PuzzleDbError {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            PuzzleDbError::Network(_) | PuzzleDbError::NetworkStatus { .. }
        )
    }
}
