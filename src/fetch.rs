use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::HttpSettings;
use crate::error::PuzzleDbError;

/// Somewhere the compressed archive can be downloaded from.
pub trait ArchiveSource: Send + Sync {
    /// Writes the full body behind `url` into `out` and returns its size.
    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64, PuzzleDbError>;
}

#[derive(Clone)]
pub struct HttpArchiveSource {
    client: Client,
    retries: usize,
}

impl HttpArchiveSource {
    pub fn new(settings: &HttpSettings) -> Result<Self, PuzzleDbError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("puzzle-db/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PuzzleDbError::Network(err.to_string()))?,
        );
        // The blocking client defaults to a 30s total timeout, far too short
        // for the full archive, so the total timeout is only set when configured.
        let builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout);
        let client = builder
            .build()
            .map_err(|err| PuzzleDbError::Network(err.to_string()))?;
        Ok(Self {
            client,
            retries: settings.retries,
        })
    }

    fn handle_status(response: Response) -> Result<Response, PuzzleDbError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .status()
            .canonical_reason()
            .unwrap_or("archive request failed")
            .to_string();
        Err(PuzzleDbError::NetworkStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, PuzzleDbError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retries && is_retryable_status(status) {
                        tracing::warn!(status, attempt = attempt + 1, "retrying archive request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.retries && is_retryable_error(&err) {
                        tracing::warn!(error = %err, attempt = attempt + 1, "retrying archive request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(PuzzleDbError::Network(err.to_string()));
                }
            }
        }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64, PuzzleDbError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        if let Some(length) = response.content_length() {
            tracing::debug!(bytes = length, "archive response");
        }
        // Body read errors are network failures; everything else is local.
        let mut writer = TrackingWriter { inner: out, failed: false };
        match io::copy(&mut response, &mut writer) {
            Ok(written) => Ok(written),
            Err(err) if writer.failed => Err(PuzzleDbError::Filesystem(err.to_string())),
            Err(err) => Err(PuzzleDbError::Network(format!("read archive body: {err}"))),
        }
    }
}

struct TrackingWriter<'a> {
    inner: &'a mut dyn Write,
    failed: bool,
}

impl Write for TrackingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.failed = true)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
