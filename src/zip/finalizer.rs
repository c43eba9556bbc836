//! Writing the merged central directory and end records.

use log::info;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{MergeError, Result};

use super::knitter::KnitState;
use super::structures::*;

/// What the trailer looked like once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Trailer {
    pub directory_size: u64,
    pub zip64: bool,
    /// Total size of the output archive
    pub output_size: u64,
}

/// True if the output needs Zip64 end records.
pub(crate) fn requires_zip64(state: &KnitState) -> bool {
    state.needs_zip64
        || exceeds_end_record(
            state.total_entries,
            state.output_position,
            state.directory.len() as u64,
        )
}

/// True if any value is out of reach of the plain end record's fields.
fn exceeds_end_record(entries: u64, directory_offset: u64, directory_size: u64) -> bool {
    entries >= ZIP64_SENTINEL_16 as u64
        || directory_offset >= ZIP64_SENTINEL_32 as u64
        || directory_size >= ZIP64_SENTINEL_32 as u64
}

/// Write the directory followed by the end records, and flush the writer.
pub(crate) async fn write_trailer<W>(state: &KnitState, writer: &mut W) -> Result<Trailer>
where
    W: AsyncWrite + Unpin,
{
    let directory_size = state.directory.len() as u64;
    let directory_offset = state.output_position;
    let directory_end = directory_offset
        .checked_add(directory_size)
        .ok_or(MergeError::OutputOverflow("central directory"))?;

    writer
        .write_all(state.directory.as_bytes())
        .await
        .map_err(MergeError::Write)?;

    let mut records = Vec::with_capacity(
        Zip64EOCD::MIN_SIZE + Zip64EOCDLocator::SIZE + EndOfCentralDirectory::SIZE,
    );
    let zip64 = requires_zip64(state);
    if zip64 {
        let version = state.max_version_needed.max(ZIP64_VERSION_NEEDED);
        let record = Zip64EOCD::for_output(
            state.total_entries,
            directory_size,
            directory_offset,
            version,
        );
        records.extend_from_slice(&record.to_bytes());
        let locator = Zip64EOCDLocator {
            disk_with_eocd64: 0,
            eocd64_offset: directory_end,
            total_disks: 1,
        };
        records.extend_from_slice(&locator.to_bytes());
        info!("writing Zip64 end records");
    }
    let eocd =
        EndOfCentralDirectory::saturated(state.total_entries, directory_size, directory_offset);
    records.extend_from_slice(&eocd.to_bytes());

    writer.write_all(&records).await.map_err(MergeError::Write)?;
    writer.flush().await.map_err(MergeError::Write)?;

    Ok(Trailer {
        directory_size,
        zip64,
        output_size: directory_end + records.len() as u64,
    })
}
