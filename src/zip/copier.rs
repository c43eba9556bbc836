//! Streaming an input's local entries to the output unchanged.

use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{MalformedReason, MergeError, Result};
use crate::io::ReadAt;

use super::knitter::KnitState;
use super::locator::ArchiveLayout;
use super::read_exact;
use super::structures::{LFH_SIZE, LocalHeader};

/// Buffer size for copying. Must be at least [`LFH_SIZE`].
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Copy every local entry of one input, header and payload, in file order.
///
/// `local_offsets` are the original offsets gathered by the loader. Sorted,
/// and capped with the central directory offset, they must tile the input
/// from its first entry to its central directory.
pub(crate) async fn copy_local_entries<R, W>(
    reader: &R,
    path: &str,
    layout: &ArchiveLayout,
    mut local_offsets: Vec<u64>,
    state: &mut KnitState,
    writer: &mut W,
) -> Result<u64>
where
    R: ReadAt + ?Sized,
    W: AsyncWrite + Unpin,
{
    if layout.entry_count == 0 {
        return Ok(0);
    }

    local_offsets.sort_unstable();
    if local_offsets[0] != layout.entries_begin {
        return Err(MergeError::malformed(
            path,
            MalformedReason::FirstEntryNotAtStart,
        ));
    }
    local_offsets.push(layout.central_dir_offset);

    let start_position = state.output_position;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    for pair in local_offsets.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let span = hi.saturating_sub(lo);
        if span < LFH_SIZE as u64 {
            return Err(MergeError::malformed(
                path,
                MalformedReason::InvalidCentralOffsets,
            ));
        }

        let mut offset = lo;
        let mut left = span;
        let mut first = true;
        while left > 0 {
            let chunk = left.min(COPY_BUFFER_SIZE as u64) as usize;
            read_exact(reader, path, offset, &mut buf[..chunk]).await?;
            if first {
                let header = LocalHeader(&buf[..LFH_SIZE]);
                if !header.has_signature() {
                    return Err(MergeError::malformed(
                        path,
                        MalformedReason::InvalidLocalHeader,
                    ));
                }
                // Some writers flag Zip64 only in the local header
                if header.uses_zip64() {
                    state.needs_zip64 = true;
                }
                first = false;
            }
            writer
                .write_all(&buf[..chunk])
                .await
                .map_err(MergeError::Write)?;
            state.advance(chunk as u64)?;
            offset += chunk as u64;
            left -= chunk as u64;
        }
    }

    state.total_entries = state
        .total_entries
        .checked_add(layout.entry_count)
        .ok_or(MergeError::OutputOverflow("total number of entries"))?;

    let copied = state.output_position - start_position;
    debug!("{path}: copied {} entries ({copied} bytes)", layout.entry_count);
    Ok(copied)
}
