use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PuzzleDbError;

/// Number of leading dataset lines kept in a subset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct SubsetSize(NonZeroUsize);

impl SubsetSize {
    pub fn new(lines: usize) -> Result<Self, PuzzleDbError> {
        NonZeroUsize::new(lines)
            .map(Self)
            .ok_or_else(|| PuzzleDbError::InvalidSubsetSize(lines.to_string()))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for SubsetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubsetSize {
    type Err = PuzzleDbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let lines = trimmed
            .parse::<usize>()
            .map_err(|_| PuzzleDbError::InvalidSubsetSize(value.to_string()))?;
        Self::new(lines)
    }
}

impl TryFrom<u64> for SubsetSize {
    type Error = PuzzleDbError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let lines = usize::try_from(value)
            .map_err(|_| PuzzleDbError::InvalidSubsetSize(value.to_string()))?;
        Self::new(lines)
    }
}

impl From<SubsetSize> for u64 {
    fn from(value: SubsetSize) -> Self {
        value.get() as u64
    }
}

/// Compression format of the remote archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Zstd,
    Gzip,
}

impl Codec {
    /// Guesses the codec from the archive URL suffix; anything that is not
    /// gzip is assumed to be the zstd archive lichess publishes.
    pub fn infer_from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".gz") {
            Codec::Gzip
        } else {
            Codec::Zstd
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Codec::Zstd => "zst",
            Codec::Gzip => "gz",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Zstd => write!(f, "zstd"),
            Codec::Gzip => write!(f, "gzip"),
        }
    }
}

impl FromStr for Codec {
    type Err = PuzzleDbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zstd" | "zst" => Ok(Codec::Zstd),
            "gzip" | "gz" => Ok(Codec::Gzip),
            _ => Err(PuzzleDbError::InvalidCodec(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "lines")]
pub enum ArtifactKind {
    Archive,
    Dataset,
    Subset(SubsetSize),
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Archive => write!(f, "archive"),
            ArtifactKind::Dataset => write!(f, "dataset"),
            ArtifactKind::Subset(size) => write!(f, "subset({size})"),
        }
    }
}

/// What a pipeline stage did with its artifact during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    Downloaded,
    Decompressed,
    Derived,
    Present,
    NotNeeded,
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageAction::Downloaded => "downloaded",
            StageAction::Decompressed => "decompressed",
            StageAction::Derived => "derived",
            StageAction::Present => "already present",
            StageAction::NotNeeded => "not needed",
        };
        write!(f, "{label}")
    }
}
