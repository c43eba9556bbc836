//! ZIP archive merging.
//!
//! This module combines several zip archives into one without decompressing
//! or recompressing any entry. Local entries are copied byte for byte; only
//! the central directory headers are rewritten, to point at the entries'
//! new positions in the output.
//!
//! ## Architecture
//!
//! Each input passes through three stages, one input at a time:
//!
//! - `locator`: find and validate the end records and central directory
//! - `loader`: append the central headers to the merged directory,
//!   rebasing each local header offset
//! - `copier`: stream the local entries to the output in file order
//!
//! Once every input is in, `duplicates` warns about repeated names and
//! `finalizer` writes the directory and end records. `knitter` holds the
//! running state and drives the stages.
//!
//! ## Zip64
//!
//! The output switches to Zip64 end records when it holds 65535 or more
//! entries, when the directory offset or size reaches 4 GiB, or when any
//! input entry already uses Zip64 fields. Entry offsets that outgrow 32 bits
//! move into a Zip64 extra field on their central header.
//!
//! ## Limitations
//!
//! - No split or spanned archives
//! - No encrypted or compressed central directories
//! - Archive comments and Zip64 extensible data are dropped

mod copier;
mod directory;
mod duplicates;
mod finalizer;
mod knitter;
mod loader;
mod locator;
mod structures;

pub use copier::COPY_BUFFER_SIZE;
pub use directory::{CentralDirectory, Entries};
pub use duplicates::find_duplicate_names;
pub use knitter::{ArchiveSummary, KnitSummary, ZipKnitter};
pub use locator::{ArchiveLayout, locate};
pub use structures::*;

use crate::error::{MergeError, Result};
use crate::io::ReadAt;

/// Read exactly `buf.len()` bytes at `offset`, tagging failures with `path`.
pub(crate) async fn read_exact<R: ReadAt + ?Sized>(
    reader: &R,
    path: &str,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    reader
        .read_exact_at(offset, buf)
        .await
        .map_err(|source| MergeError::read(path, source))
}
