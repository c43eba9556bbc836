mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing on a short source
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of file",
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// Returns true if `input` names an HTTP(S) resource rather than a local path
pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Open an input archive given as a local path or an HTTP URL
pub async fn open_input(input: &str) -> io::Result<Box<dyn ReadAt>> {
    if is_http_url(input) {
        Ok(Box::new(HttpRangeReader::new(input.to_string()).await?))
    } else {
        Ok(Box::new(LocalFileReader::new(Path::new(input))?))
    }
}
