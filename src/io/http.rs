//! Remote inputs read through HTTP range requests.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::io;
use std::time::Duration;

use super::ReadAt;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 10;
/// Back-off grows linearly with each failed attempt
const RETRY_STEP: Duration = Duration::from_millis(500);

fn http_error<E>(error: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::other(error)
}

/// Inclusive byte range for `len` bytes at `offset`, clipped to `size`.
fn byte_range(offset: u64, len: usize, size: u64) -> Option<(u64, u64)> {
    if len == 0 || offset >= size {
        return None;
    }
    let last = offset.saturating_add(len as u64 - 1).min(size - 1);
    Some((offset, last))
}

/// Archive size from a HEAD response, if the server will serve byte ranges.
fn probe_headers(headers: &HeaderMap) -> io::Result<u64> {
    let ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    if !ranges.contains("bytes") {
        return Err(http_error("server does not accept byte range requests"));
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| http_error("server did not report a Content-Length"))
}

/// Input archive served over HTTP(S).
///
/// The archive is never downloaded whole: the end records, the central
/// directory and each local entry are fetched with separate range requests.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
}

impl HttpRangeReader {
    /// Connect to `url` and learn the archive size with a HEAD request.
    pub async fn new(url: String) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(http_error)?;

        let resp = client.head(&url).send().await.map_err(http_error)?;
        if !resp.status().is_success() {
            return Err(http_error(format!("HEAD {url}: {}", resp.status())));
        }
        let size = probe_headers(resp.headers())?;
        debug!("{url}: {size} bytes");

        Ok(Self { client, url, size })
    }

    /// One GET for `first..=last` into `buf`, retried on timeouts and
    /// connection errors. Returns the number of bytes stored.
    async fn fetch(&self, first: u64, last: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut attempt = 0;
        loop {
            let sent = self
                .client
                .get(&self.url)
                .header(RANGE, format!("bytes={first}-{last}"))
                .send()
                .await;

            match sent {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    let body = resp.bytes().await.map_err(http_error)?;
                    let n = body.len().min(buf.len());
                    buf[..n].copy_from_slice(&body[..n]);
                    return Ok(n);
                }
                Ok(resp) => {
                    return Err(http_error(format!("GET {}: {}", self.url, resp.status())));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("{}: giving up after {attempt} attempts: {e}", self.url),
                        ));
                    }
                    warn!("{}: {e}, retrying ({attempt}/{MAX_ATTEMPTS})", self.url);
                    tokio::time::sleep(RETRY_STEP * attempt).await;
                }
                Err(e) => return Err(http_error(e)),
            }
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Some((first, last)) = byte_range(offset, buf.len(), self.size) else {
            return Ok(0);
        };
        let wanted = (last - first + 1) as usize;

        let mut filled = 0;
        while filled < wanted {
            let n = self
                .fetch(first + filled as u64, last, &mut buf[filled..wanted])
                .await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
