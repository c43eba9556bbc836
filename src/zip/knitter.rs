use log::{debug, info, warn};
use tokio::io::AsyncWrite;

use crate::error::{MergeError, Result};
use crate::io::ReadAt;

use super::copier::copy_local_entries;
use super::directory::CentralDirectory;
use super::duplicates::find_duplicate_names;
use super::finalizer::write_trailer;
use super::loader::load_central_directory;
use super::locator::{ArchiveLayout, locate};

/// Running totals shared by every stage of a merge.
#[derive(Debug, Default)]
pub(crate) struct KnitState {
    pub(crate) directory: CentralDirectory,
    pub(crate) total_entries: u64,
    pub(crate) max_version_needed: u16,
    pub(crate) needs_zip64: bool,
    /// Bytes written to the output so far; only ever grows
    pub(crate) output_position: u64,
}

impl KnitState {
    pub(crate) fn advance(&mut self, bytes: u64) -> Result<()> {
        self.output_position = self
            .output_position
            .checked_add(bytes)
            .ok_or(MergeError::OutputOverflow("output"))?;
        Ok(())
    }
}

/// Result of adding one input archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub layout: ArchiveLayout,
    /// Output offset the input's first entry was written at
    pub output_offset: u64,
    /// Bytes of local entries copied to the output
    pub bytes_copied: u64,
}

/// Result of a completed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnitSummary {
    pub total_entries: u64,
    pub directory_size: u64,
    pub output_size: u64,
    /// Whether Zip64 end records were written
    pub zip64: bool,
    /// Names that repeat an earlier entry, in directory order
    pub duplicate_names: Vec<Vec<u8>>,
}

/// Merges zip archives into one without touching entry data.
///
/// Inputs are added one at a time with [`add_archive`](Self::add_archive);
/// their local entries stream straight to the writer while their central
/// directories accumulate in memory. [`finish`](Self::finish) then writes
/// the merged directory and end records.
///
/// ## Example
///
/// ```no_run
/// use zipknit::{LocalFileReader, ZipKnitter};
/// use std::path::Path;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let out = tokio::fs::File::create("all.zip").await?;
/// let mut knitter = ZipKnitter::new(out);
/// for path in ["a.zip", "b.zip"] {
///     let reader = LocalFileReader::new(Path::new(path))?;
///     knitter.add_archive(&reader, path).await?;
/// }
/// let (summary, _file) = knitter.finish().await?;
/// println!("{} entries", summary.total_entries);
/// # Ok(())
/// # }
/// ```
pub struct ZipKnitter<W> {
    writer: W,
    state: KnitState,
    /// Set once an input fails; the output can no longer be completed
    failed: bool,
}

impl<W: AsyncWrite + Unpin> ZipKnitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: KnitState::default(),
            failed: false,
        }
    }

    /// Entries merged so far.
    pub fn total_entries(&self) -> u64 {
        self.state.total_entries
    }

    /// Bytes written to the output so far.
    pub fn output_position(&self) -> u64 {
        self.state.output_position
    }

    /// Append one input archive.
    ///
    /// Any error leaves the output incomplete. Every later call, including
    /// [`finish`](Self::finish), then fails with [`MergeError::Abandoned`].
    pub async fn add_archive<R: ReadAt + ?Sized>(
        &mut self,
        reader: &R,
        path: &str,
    ) -> Result<ArchiveSummary> {
        if self.failed {
            return Err(MergeError::Abandoned);
        }
        let added = self.merge_archive(reader, path).await;
        self.failed = added.is_err();
        added
    }

    async fn merge_archive<R: ReadAt + ?Sized>(
        &mut self,
        reader: &R,
        path: &str,
    ) -> Result<ArchiveSummary> {
        let output_offset = self.state.output_position;
        let layout = locate(reader, path).await?;
        let local_offsets = load_central_directory(reader, path, &layout, &mut self.state).await?;
        if layout.entry_count == 0 {
            warn!("{path} is empty");
        }
        let bytes_copied = copy_local_entries(
            reader,
            path,
            &layout,
            local_offsets,
            &mut self.state,
            &mut self.writer,
        )
        .await?;
        info!("{path}: merged {} entries", layout.entry_count);

        Ok(ArchiveSummary {
            layout,
            output_offset,
            bytes_copied,
        })
    }

    /// Check for duplicate names, write the directory and end records, and
    /// hand back the writer.
    pub async fn finish(mut self) -> Result<(KnitSummary, W)> {
        if self.failed {
            return Err(MergeError::Abandoned);
        }
        let duplicate_names = if self.state.total_entries < 2 {
            Vec::new()
        } else {
            find_duplicate_names(&self.state.directory)
        };
        let trailer = write_trailer(&self.state, &mut self.writer).await?;
        debug!(
            "wrote {} byte central directory at {}",
            trailer.directory_size, self.state.output_position
        );

        let summary = KnitSummary {
            total_entries: self.state.total_entries,
            directory_size: trailer.directory_size,
            output_size: trailer.output_size,
            zip64: trailer.zip64,
            duplicate_names,
        };
        Ok((summary, self.writer))
    }
}
