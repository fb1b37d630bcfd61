use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::domain::Codec;
use crate::error::PuzzleDbError;

const COPY_BUFFER: usize = 64 * 1024;

/// Streams the decompressed contents of `archive` into `out` and returns the
/// number of bytes written. Decoder failures surface as `Decompression`,
/// write failures as `Filesystem`.
pub fn decompress_archive<W: Write>(
    archive: &Path,
    codec: Codec,
    out: &mut W,
) -> Result<u64, PuzzleDbError> {
    let file = File::open(archive).map_err(|err| {
        PuzzleDbError::Decompression(format!("open archive {}: {err}", archive.display()))
    })?;
    let mut decoder: Box<dyn Read> = match codec {
        Codec::Zstd => Box::new(zstd::stream::read::Decoder::new(file).map_err(|err| {
            PuzzleDbError::Decompression(format!("init zstd decoder: {err}"))
        })?),
        Codec::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(file))),
    };

    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;
    loop {
        let read = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(PuzzleDbError::Decompression(format!(
                    "{} ({codec}): {err}",
                    archive.display()
                )));
            }
        };
        out.write_all(&buf[..read])
            .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
        total += read as u64;
    }
    out.flush()
        .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
    Ok(total)
}

/// Copies up to `max_lines` leading lines of `input` to `out` byte for byte,
/// line terminators included. Returns the number of lines copied, which is
/// smaller than `max_lines` when the input runs out first.
pub fn copy_line_prefix<R: Read, W: Write>(
    input: R,
    max_lines: usize,
    out: &mut W,
) -> Result<usize, PuzzleDbError> {
    let mut reader = BufReader::with_capacity(COPY_BUFFER, input);
    let mut line = Vec::new();
    let mut copied = 0usize;
    while copied < max_lines {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|err| PuzzleDbError::Filesystem(format!("read dataset: {err}")))?;
        if read == 0 {
            break;
        }
        out.write_all(&line)
            .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
        copied += 1;
    }
    out.flush()
        .map_err(|err| PuzzleDbError::Filesystem(err.to_string()))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_archive_is_a_decompression_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lichess_db_puzzle.csv.zst");
        let mut out = Vec::new();
        let err = decompress_archive(&archive, Codec::Zstd, &mut out).unwrap_err();
        assert_matches!(err, PuzzleDbError::Decompression(_));
        assert!(out.is_empty());
    }

    #[test]
    fn prefix_keeps_terminators() {
        let input = b"a,1\r\nb,2\nc,3\n".as_slice();
        let mut out = Vec::new();
        let copied = copy_line_prefix(input, 2, &mut out).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(out, b"a,1\r\nb,2\n");
    }

    #[test]
    fn prefix_of_short_input_is_whole_input() {
        let input = b"a\nb\nlast-without-newline".as_slice();
        let mut out = Vec::new();
        let copied = copy_line_prefix(input, 50, &mut out).unwrap();
        assert_eq!(copied, 3);
        assert_eq!(out, input);
    }

    #[test]
    fn prefix_of_empty_input() {
        let mut out = Vec::new();
        assert_eq!(copy_line_prefix(io::empty(), 10, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
