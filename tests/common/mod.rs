#![allow(dead_code)]

use std::io::Write;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use lichess_puzzle_db::app::{ProgressEvent, ProgressSink};
use lichess_puzzle_db::config::ResolvedConfig;
use lichess_puzzle_db::domain::SubsetSize;
use lichess_puzzle_db::error::PuzzleDbError;
use lichess_puzzle_db::fetch::ArchiveSource;

pub const TEST_URL: &str = "https://example.invalid/lichess_db_puzzle.csv.zst";

/// Serves a fixed body, or a fixed HTTP status, and counts requests.
pub struct MockSource {
    body: Option<Vec<u8>>,
    status: u16,
    calls: Mutex<usize>,
}

impl MockSource {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            status: 200,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            body: None,
            status,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ArchiveSource for MockSource {
    fn download(&self, _url: &str, out: &mut dyn Write) -> Result<u64, PuzzleDbError> {
        *self.calls.lock().unwrap() += 1;
        match &self.body {
            Some(body) => {
                out.write_all(body)
                    .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
                Ok(body.len() as u64)
            }
            None => Err(PuzzleDbError::NetworkStatus {
                status: self.status,
                message: "Not Found".to_string(),
            }),
        }
    }
}

impl ArchiveSource for &MockSource {
    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64, PuzzleDbError> {
        (*self).download(url, out)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

pub fn puzzle_lines(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PuzzleId,FEN,Moves,Rating,RatingDeviation,Popularity,NbPlays,Themes,GameUrl,OpeningTags\n");
    for i in 1..count {
        out.extend_from_slice(
            format!(
                "{i:05},r6k/pp2r2p/4Rp1Q/3p4/8/1N1P2R1/PqP2bPP/7K b - - 0 24,f2g3 e6e7,{},75,95,{},crushing mateIn2,https://lichess.org/xyz{i},\n",
                1500 + i,
                i * 3
            )
            .as_bytes(),
        );
    }
    out
}

pub fn zstd_archive(data: &[u8]) -> Vec<u8> {
    zstd::encode_all(data, 3).unwrap()
}

pub fn sizes(values: &[usize]) -> Vec<SubsetSize> {
    values
        .iter()
        .map(|lines| SubsetSize::new(*lines).unwrap())
        .collect()
}

pub fn config_in(dir: &std::path::Path, name: &str, subset_sizes: &[usize]) -> ResolvedConfig {
    let root = Utf8PathBuf::from_path_buf(dir.join(name)).unwrap();
    ResolvedConfig::new(root, TEST_URL, sizes(subset_sizes))
}

pub fn count_lines(bytes: &[u8]) -> usize {
    bytes.split_inclusive(|byte| *byte == b'\n').count()
}
