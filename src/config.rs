use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::{Codec, SubsetSize};
use crate::error::PuzzleDbError;

pub const DEFAULT_CONFIG_FILE: &str = "puzzle-db.json";
pub const DEFAULT_WORKING_DIR: &str = "db";
pub const DEFAULT_REMOTE_URL: &str = "https://database.lichess.org/lichess_db_puzzle.csv.zst";
pub const DEFAULT_DATASET_NAME: &str = "lichess_db_puzzle";
pub const DEFAULT_SUBSET_SIZES: [usize; 2] = [50, 500];
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRIES: usize = 3;

/// On-disk shape of `puzzle-db.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub subset_sizes: Option<Vec<u64>>,
    #[serde(default)]
    pub codec: Option<Codec>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub working_dir: Option<String>,
    pub remote_url: Option<String>,
    pub subset_sizes: Vec<SubsetSize>,
    pub codec: Option<Codec>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub working_dir: Utf8PathBuf,
    pub remote_url: String,
    pub dataset_name: String,
    pub subset_sizes: Vec<SubsetSize>,
    pub codec: Codec,
    pub http: HttpSettings,
}

impl ResolvedConfig {
    /// Builds a configuration for the given working directory, remote URL and
    /// subset sizes, with every other setting at its default.
    pub fn new(
        working_dir: impl Into<Utf8PathBuf>,
        remote_url: impl Into<String>,
        subset_sizes: Vec<SubsetSize>,
    ) -> Self {
        let remote_url = remote_url.into();
        Self {
            working_dir: working_dir.into(),
            codec: Codec::infer_from_url(&remote_url),
            remote_url,
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            subset_sizes: dedup_sizes(subset_sizes),
            http: HttpSettings::default(),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_WORKING_DIR,
            DEFAULT_REMOTE_URL,
            default_subset_sizes(),
        )
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file (if any) and applies overrides. A missing
    /// default file is not an error; a missing explicit path is.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, PuzzleDbError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| PuzzleDbError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| PuzzleDbError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, PuzzleDbError> {
        let working_dir = overrides
            .working_dir
            .or(config.working_dir)
            .unwrap_or_else(|| DEFAULT_WORKING_DIR.to_string());
        if working_dir.trim().is_empty() {
            return Err(PuzzleDbError::Filesystem(
                "working directory must not be empty".to_string(),
            ));
        }

        let remote_url = overrides
            .remote_url
            .or(config.remote_url)
            .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        validate_url(&remote_url)?;

        let subset_sizes = if !overrides.subset_sizes.is_empty() {
            overrides.subset_sizes
        } else if let Some(sizes) = config.subset_sizes {
            sizes
                .into_iter()
                .map(SubsetSize::try_from)
                .collect::<Result<Vec<_>, PuzzleDbError>>()?
        } else {
            default_subset_sizes()
        };

        let codec = overrides
            .codec
            .or(config.codec)
            .unwrap_or_else(|| Codec::infer_from_url(&remote_url));

        let http = HttpSettings {
            timeout: overrides
                .timeout_secs
                .or(config.timeout_secs)
                .map(Duration::from_secs),
            connect_timeout: Duration::from_secs(
                config
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            retries: overrides
                .retries
                .or(config.retries)
                .unwrap_or(DEFAULT_RETRIES),
        };

        Ok(ResolvedConfig {
            working_dir: Utf8PathBuf::from(working_dir),
            remote_url,
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            subset_sizes: dedup_sizes(subset_sizes),
            codec,
            http,
        })
    }
}

pub fn default_subset_sizes() -> Vec<SubsetSize> {
    DEFAULT_SUBSET_SIZES
        .iter()
        .filter_map(|lines| SubsetSize::new(*lines).ok())
        .collect()
}

fn validate_url(value: &str) -> Result<(), PuzzleDbError> {
    let url = Url::parse(value).map_err(|err| PuzzleDbError::InvalidUrl(format!("{value}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PuzzleDbError::InvalidUrl(format!(
            "{value}: unsupported scheme {other}"
        ))),
    }
}

// Keeps the first occurrence of each size so subsets are derived in the
// order they were requested.
fn dedup_sizes(sizes: Vec<SubsetSize>) -> Vec<SubsetSize> {
    let mut out = Vec::with_capacity(sizes.len());
    for size in sizes {
        if !out.contains(&size) {
            out.push(size);
        }
    }
    out
}
